pub mod build_info;
pub mod persistence;

use std::sync::Once;

use tracing_subscriber::{filter::Directive, fmt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "obligation_core=info";

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber with the default filter.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Initializes the global tracing subscriber. `RUST_LOG` directives are combined with
/// `default_directive`; an unparsable directive falls back to [`DEFAULT_LOG_FILTER`].
pub fn init_tracing_with(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        let directive = default_directive
            .parse::<Directive>()
            .or_else(|_| DEFAULT_LOG_FILTER.parse::<Directive>());
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = directive {
            filter = filter.add_directive(directive);
        }
        // Another subscriber may already be installed by the host application.
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
