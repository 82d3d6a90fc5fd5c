//! Entry point callers use to manage and lazily materialize recurring obligations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use super::scheduler::ProcessReport;
use crate::config::Config;
use crate::core::collaborators::TransactionSink;
use crate::core::errors::{ObligationError, Result};
use crate::core::time::Clock;
use crate::ledger::{MaterializeOutcome, ObligationDraft, RecurringObligation, RuleChanges};
use crate::storage::ObligationRepository;

/// Hands out one mutex per obligation id.
#[derive(Default)]
pub struct ObligationLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ObligationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, id: Uuid) -> Result<Arc<Mutex<()>>> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| ObligationError::StorageError("lock registry poisoned".into()))?;
        Ok(map.entry(id).or_default().clone())
    }

    pub fn forget(&self, id: Uuid) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Combines a repository, a transaction sink and a clock.
///
/// Every read-check-materialize-persist cycle for an obligation runs under that
/// obligation's lock, and the final write is a compare-and-swap on the trigger date the
/// cycle started from.
pub struct RecurringService {
    repo: Arc<dyn ObligationRepository>,
    sink: Arc<dyn TransactionSink>,
    clock: Arc<dyn Clock>,
    locks: ObligationLocks,
    retire_completed: bool,
}

impl RecurringService {
    pub fn new(
        repo: Arc<dyn ObligationRepository>,
        sink: Arc<dyn TransactionSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            sink,
            clock,
            locks: ObligationLocks::new(),
            retire_completed: false,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.retire_completed = config.retire_completed;
        self
    }

    /// Deletes obligations as soon as they complete instead of keeping them.
    pub fn retire_completed(mut self, retire: bool) -> Self {
        self.retire_completed = retire;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn create(&self, draft: ObligationDraft) -> Result<RecurringObligation> {
        let obligation = RecurringObligation::from_draft(draft, self.clock.now())?;
        self.repo.insert(&obligation)?;
        info!(
            obligation = %obligation.id,
            owner = %obligation.owner_id,
            cadence = %obligation.rule().label(),
            "created recurring obligation"
        );
        Ok(obligation)
    }

    /// Stores an obligation built elsewhere.
    pub fn add(&self, obligation: RecurringObligation) -> Result<RecurringObligation> {
        self.repo.insert(&obligation)?;
        Ok(obligation)
    }

    pub fn get(&self, id: Uuid) -> Result<RecurringObligation> {
        self.repo.get(id)?.ok_or(ObligationError::NotFound(id))
    }

    /// Materializes the owner's due obligations, then returns all of the owner's records.
    ///
    /// Materialization failures are logged and left for the next call.
    pub fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<RecurringObligation>> {
        let report = self.process_owner(owner_id)?;
        if !report.is_clean() {
            warn!(
                owner = %owner_id,
                failures = report.failures.len(),
                "some obligations could not be materialized"
            );
        }
        self.repo.list_by_owner(owner_id)
    }

    /// Runs one materialization pass over the owner's active obligations.
    pub fn process_owner(&self, owner_id: Uuid) -> Result<ProcessReport> {
        let today = self.clock.today();
        let candidates = self.repo.list_active_by_owner(owner_id)?;
        info!(owner = %owner_id, candidates = candidates.len(), %today, "processing due obligations");

        let mut report = ProcessReport::default();
        for candidate in candidates {
            if !candidate.is_due(today) {
                report.not_due += 1;
                continue;
            }
            match self.process_locked(candidate.id, today) {
                Ok(outcome) => report.record_outcome(candidate.id, outcome),
                Err(err) => report.record_failure(candidate.id, err),
            }
        }
        Ok(report)
    }

    /// Materializes a single obligation if it is due today.
    pub fn process_obligation(&self, id: Uuid) -> Result<MaterializeOutcome> {
        self.process_locked(id, self.clock.today())
    }

    fn process_locked(&self, id: Uuid, today: NaiveDate) -> Result<MaterializeOutcome> {
        let handle = self.locks.handle(id)?;
        let _guard = handle
            .lock()
            .map_err(|_| ObligationError::StorageError(format!("lock for {id} poisoned")))?;

        // Re-read under the lock: a racing caller may already have advanced the rule.
        let Some(mut obligation) = self.repo.get(id)? else {
            return Ok(MaterializeOutcome::NotDue);
        };
        let expected = obligation.next_trigger_date();
        let outcome = obligation.materialize(today, self.sink.as_ref())?;

        if let MaterializeOutcome::Materialized { completed, .. } = outcome {
            if completed && self.retire_completed {
                self.repo.delete(id)?;
                self.locks.forget(id);
                info!(obligation = %id, "retired completed obligation");
            } else if let Err(err) = self.repo.persist(&obligation, expected) {
                if err.is_recoverable() {
                    warn!(obligation = %id, error = %err, "concurrent update detected");
                }
                return Err(err);
            }
        }
        Ok(outcome)
    }

    /// Applies `mutator` to the stored obligation and writes it back under its lock.
    pub fn update<F>(&self, id: Uuid, mutator: F) -> Result<RecurringObligation>
    where
        F: FnOnce(&mut RecurringObligation, NaiveDate) -> Result<()>,
    {
        let handle = self.locks.handle(id)?;
        let _guard = handle
            .lock()
            .map_err(|_| ObligationError::StorageError(format!("lock for {id} poisoned")))?;
        let mut obligation = self.get(id)?;
        let expected = obligation.next_trigger_date();
        mutator(&mut obligation, self.clock.today())?;
        self.repo.persist(&obligation, expected)?;
        Ok(obligation)
    }

    pub fn update_details(
        &self,
        id: Uuid,
        title: Option<String>,
        amount: Option<f64>,
        notes: Option<Option<String>>,
    ) -> Result<RecurringObligation> {
        self.update(id, |obligation, _| {
            obligation.update_details(title, amount, notes)
        })
    }

    pub fn update_rule(&self, id: Uuid, changes: RuleChanges) -> Result<RecurringObligation> {
        self.update(id, |obligation, today| {
            obligation.update_rule(changes, today).map(|_| ())
        })
    }

    pub fn set_category(&self, id: Uuid, category_id: Option<Uuid>) -> Result<RecurringObligation> {
        self.update(id, |obligation, _| obligation.set_category(category_id))
    }

    pub fn pause(&self, id: Uuid) -> Result<RecurringObligation> {
        self.update(id, |obligation, _| obligation.pause())
    }

    pub fn resume(&self, id: Uuid) -> Result<RecurringObligation> {
        self.update(id, |obligation, today| obligation.resume(today))
    }

    pub fn reactivate(&self, id: Uuid) -> Result<RecurringObligation> {
        self.update(id, |obligation, today| {
            obligation.reactivate(today).map_err(|err| {
                warn!(obligation = %obligation.id, error = %err, "reactivation rejected");
                err
            })
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let handle = self.locks.handle(id)?;
        let removed = {
            let _guard = handle
                .lock()
                .map_err(|_| ObligationError::StorageError(format!("lock for {id} poisoned")))?;
            self.repo.delete(id)?
        };
        self.locks.forget(id);
        if !removed {
            return Err(ObligationError::NotFound(id));
        }
        info!(obligation = %id, "deleted recurring obligation");
        Ok(())
    }

    /// Next `count` trigger dates of an obligation without materializing anything.
    pub fn upcoming(&self, id: Uuid, count: usize) -> Result<Vec<NaiveDate>> {
        self.get(id)?.rule().upcoming(count)
    }
}
