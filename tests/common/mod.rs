#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use obligation_core::{
    config::ConfigManager,
    core::{services::RecurringService, time::FixedClock},
    ledger::{InMemoryLedger, ObligationDraft, ObligationKind, RuleSpec},
    storage::JsonObligationStore,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;
use uuid::Uuid;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Creates a unique directory that outlives the calling test.
pub fn temp_base() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    base
}

pub struct TestEnv {
    pub base: PathBuf,
    pub store: Arc<JsonObligationStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub clock: Arc<FixedClock>,
    pub service: RecurringService,
    pub config: ConfigManager,
}

/// Wires a service over a JSON store in a fresh directory.
pub fn setup_test_env(today: NaiveDate) -> TestEnv {
    let base = temp_base();
    let store = Arc::new(
        JsonObligationStore::new(Some(base.clone()), Some(3)).expect("create json store"),
    );
    let ledger = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(FixedClock::at_date(today));
    let service = RecurringService::new(store.clone(), ledger.clone(), clock.clone());
    let config = ConfigManager::with_base_dir(base.clone()).expect("create config manager");
    TestEnv {
        base,
        store,
        ledger,
        clock,
        service,
        config,
    }
}

pub fn expense_draft(owner: Uuid, title: &str, frequency: &str, start: NaiveDate) -> ObligationDraft {
    ObligationDraft {
        owner_id: owner,
        kind: ObligationKind::Expense,
        title: title.into(),
        amount: 25.0,
        notes: None,
        category_id: None,
        rule: RuleSpec {
            frequency: frequency.into(),
            interval: 1,
            start_date: start,
            end_date: None,
        },
    }
}
