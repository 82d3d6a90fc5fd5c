#![doc(test(attr(deny(warnings))))]

//! Obligation Core schedules recurring expenses, incomes and category budgets, and turns
//! due occurrences into one-off transactions through caller-supplied collaborators.

pub mod config;
pub mod core;
pub mod ledger;
pub mod storage;
pub mod utils;

pub use crate::core::errors::{ObligationError, Result};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    init_with(&config::Config::default());
}

/// Same as [`init`], using the log filter from `config`.
pub fn init_with(config: &config::Config) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing_with(&config.log_filter);
        let build = utils::build_info::current();
        tracing::info!(
            build = %build.summary(),
            target = build.target,
            built_at = build.timestamp,
            "Obligation Core tracing initialized."
        );
    });
}
