use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use uuid::Uuid;

use super::{check_expected, sort_for_listing, ObligationRepository};
use crate::core::errors::{ObligationError, Result};
use crate::ledger::RecurringObligation;

/// Process-local repository backed by a map.
#[derive(Default)]
pub struct InMemoryObligationRepository {
    records: RwLock<HashMap<Uuid, RecurringObligation>>,
}

impl InMemoryObligationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, RecurringObligation>>> {
        self.records
            .read()
            .map_err(|_| ObligationError::StorageError("repository lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, RecurringObligation>>> {
        self.records
            .write()
            .map_err(|_| ObligationError::StorageError("repository lock poisoned".into()))
    }
}

impl ObligationRepository for InMemoryObligationRepository {
    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<RecurringObligation>> {
        let mut owned: Vec<_> = self
            .read()?
            .values()
            .filter(|obligation| obligation.owner_id == owner_id)
            .cloned()
            .collect();
        sort_for_listing(&mut owned);
        Ok(owned)
    }

    fn get(&self, id: Uuid) -> Result<Option<RecurringObligation>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn insert(&self, obligation: &RecurringObligation) -> Result<()> {
        let mut records = self.write()?;
        if records.contains_key(&obligation.id) {
            return Err(ObligationError::Validation(format!(
                "obligation {} already exists",
                obligation.id
            )));
        }
        records.insert(obligation.id, obligation.clone());
        Ok(())
    }

    fn persist(
        &self,
        obligation: &RecurringObligation,
        expected_next_trigger: NaiveDate,
    ) -> Result<()> {
        let mut records = self.write()?;
        let stored = records
            .get(&obligation.id)
            .ok_or(ObligationError::NotFound(obligation.id))?;
        check_expected(stored, expected_next_trigger)?;
        records.insert(obligation.id, obligation.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.remove(&id).is_some())
    }
}
