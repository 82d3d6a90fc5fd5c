pub mod json_backend;
pub mod memory;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::core::errors::{ObligationError, Result};
use crate::ledger::RecurringObligation;

/// Persistence seam for obligations.
///
/// `persist` is a compare-and-swap: the write only lands when the stored rule still has
/// `expected_next_trigger` as its next trigger date.
pub trait ObligationRepository: Send + Sync {
    fn list_active_by_owner(&self, owner_id: Uuid) -> Result<Vec<RecurringObligation>> {
        Ok(self
            .list_by_owner(owner_id)?
            .into_iter()
            .filter(RecurringObligation::is_active)
            .collect())
    }
    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<RecurringObligation>>;
    fn get(&self, id: Uuid) -> Result<Option<RecurringObligation>>;
    fn insert(&self, obligation: &RecurringObligation) -> Result<()>;
    fn persist(
        &self,
        obligation: &RecurringObligation,
        expected_next_trigger: NaiveDate,
    ) -> Result<()>;
    /// Returns whether a record was removed.
    fn delete(&self, id: Uuid) -> Result<bool>;
}

pub(crate) fn check_expected(
    stored: &RecurringObligation,
    expected_next_trigger: NaiveDate,
) -> Result<()> {
    let found = stored.next_trigger_date();
    if found != expected_next_trigger {
        return Err(ObligationError::Conflict {
            id: stored.id,
            expected: expected_next_trigger,
            found,
        });
    }
    Ok(())
}

pub(crate) fn sort_for_listing(obligations: &mut [RecurringObligation]) {
    obligations.sort_by(|a, b| {
        a.next_trigger_date()
            .cmp(&b.next_trigger_date())
            .then_with(|| a.title().cmp(b.title()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub use json_backend::JsonObligationStore;
pub use memory::InMemoryObligationRepository;
