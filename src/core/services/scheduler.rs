//! Batch driver that materializes whichever obligations are due.

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::collaborators::TransactionSink;
use crate::core::errors::ObligationError;
use crate::ledger::{MaterializeOutcome, RecurringObligation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedEntry {
    pub obligation_id: Uuid,
    pub transaction_id: Uuid,
    pub trigger_date: NaiveDate,
    pub next_trigger_date: NaiveDate,
}

#[derive(Debug)]
pub struct ProcessFailure {
    pub obligation_id: Uuid,
    pub error: ObligationError,
}

/// Per-obligation results of one pass.
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub materialized: Vec<MaterializedEntry>,
    /// Obligations whose rule became terminal during this pass.
    pub completed: Vec<Uuid>,
    pub failures: Vec<ProcessFailure>,
    pub not_due: usize,
}

impl ProcessReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn materialized_count(&self) -> usize {
        self.materialized.len()
    }

    /// Conflicts the caller can clear by running another pass.
    pub fn recoverable_failures(&self) -> impl Iterator<Item = &ProcessFailure> {
        self.failures
            .iter()
            .filter(|failure| failure.error.is_recoverable())
    }

    pub fn record_outcome(&mut self, obligation_id: Uuid, outcome: MaterializeOutcome) {
        match outcome {
            MaterializeOutcome::NotDue => self.not_due += 1,
            MaterializeOutcome::Materialized {
                transaction_id,
                trigger_date,
                next_trigger_date,
                completed,
            } => {
                self.materialized.push(MaterializedEntry {
                    obligation_id,
                    transaction_id,
                    trigger_date,
                    next_trigger_date,
                });
                if completed {
                    info!(obligation = %obligation_id, "obligation reached its end date");
                    self.completed.push(obligation_id);
                }
            }
        }
    }

    pub fn record_failure(&mut self, obligation_id: Uuid, error: ObligationError) {
        warn!(obligation = %obligation_id, error = %error, "materialization failed");
        self.failures.push(ProcessFailure {
            obligation_id,
            error,
        });
    }

    pub fn merge(&mut self, other: ProcessReport) {
        self.materialized.extend(other.materialized);
        self.completed.extend(other.completed);
        self.failures.extend(other.failures);
        self.not_due += other.not_due;
    }
}

/// Stateless pass over a slice of obligations.
pub struct MaterializationScheduler;

impl MaterializationScheduler {
    /// Materializes every due obligation in `obligations`. One failure never stops the
    /// rest of the batch.
    pub fn process_due(
        obligations: &mut [RecurringObligation],
        now: NaiveDate,
        sink: &dyn TransactionSink,
    ) -> ProcessReport {
        let mut report = ProcessReport::default();
        for obligation in obligations.iter_mut() {
            let id = obligation.id;
            match obligation.materialize(now, sink) {
                Ok(outcome) => report.record_outcome(id, outcome),
                Err(err) => report.record_failure(id, err),
            }
        }
        debug!(
            materialized = report.materialized.len(),
            failures = report.failures.len(),
            not_due = report.not_due,
            "scheduler pass finished"
        );
        report
    }
}
