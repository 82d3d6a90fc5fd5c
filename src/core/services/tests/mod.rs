
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::core::collaborators::{CategoryAggregator, SinkError, TransactionSink};
use crate::ledger::{Frequency, ObligationKind, RecurrenceRule, RecurringObligation, TransactionDraft};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(super) fn obligation(
    owner: Uuid,
    title: &str,
    frequency: Frequency,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> RecurringObligation {
    let rule = RecurrenceRule::new(frequency, 1, start, end).unwrap();
    RecurringObligation::new(owner, ObligationKind::Expense, title, 10.0, rule, Utc::now()).unwrap()
}

/// Sink that fails for a chosen set of obligations.
#[derive(Default)]
pub(super) struct FlakySink {
    pub failing: Mutex<Vec<Uuid>>,
    pub created: Mutex<Vec<TransactionDraft>>,
}

impl FlakySink {
    pub fn fail_for(&self, id: Uuid) {
        self.failing.lock().unwrap().push(id);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl TransactionSink for FlakySink {
    fn create_transaction(&self, draft: &TransactionDraft) -> Result<Uuid, SinkError> {
        if self.failing.lock().unwrap().contains(&draft.obligation_id) {
            return Err(SinkError::Unavailable("ledger offline".into()));
        }
        self.created.lock().unwrap().push(draft.clone());
        Ok(Uuid::new_v4())
    }
}

#[derive(Default)]
pub(super) struct RejectingAggregator;

impl CategoryAggregator for RejectingAggregator {
    fn reset_window(&self, _category_id: Uuid, _window_start: NaiveDate) -> Result<(), SinkError> {
        Err(SinkError::Rejected("aggregation paused".into()))
    }
}
