use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::obligation::ObligationKind;
use super::time_interval::DateWindow;
use crate::core::collaborators::{CategoryAggregator, SinkError, TransactionSink};

/// Request handed to a [`TransactionSink`] when an obligation falls due.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    pub obligation_id: Uuid,
    pub owner_id: Uuid,
    pub kind: ObligationKind,
    pub title: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    pub trigger_date: NaiveDate,
}

impl TransactionDraft {
    /// Stable key for one obligation occurrence: `"{obligation_id}:{trigger_date}"`.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.obligation_id, self.trigger_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: ObligationKind,
    pub title: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_obligation: Option<Uuid>,
}

impl Transaction {
    /// A one-off entry that did not come from an obligation.
    pub fn manual(
        owner_id: Uuid,
        kind: ObligationKind,
        title: impl Into<String>,
        amount: f64,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            title: title.into(),
            amount,
            date,
            notes: None,
            category_id: None,
            source_obligation: None,
        }
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    fn from_draft(draft: &TransactionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id,
            kind: draft.kind,
            title: draft.title.clone(),
            amount: draft.amount,
            date: draft.date,
            notes: draft.notes.clone(),
            category_id: draft.category_id,
            source_obligation: Some(draft.obligation_id),
        }
    }
}

/// Sums the expense magnitude of `category_id` transactions dated inside `window`.
pub fn category_spent_in<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    category_id: Uuid,
    window: &DateWindow,
) -> f64 {
    transactions
        .into_iter()
        .filter(|txn| txn.category_id == Some(category_id))
        .filter(|txn| txn.kind != ObligationKind::Income)
        .filter(|txn| window.contains(txn.date))
        .map(|txn| txn.amount.abs())
        .sum()
}

#[derive(Default)]
struct LedgerState {
    transactions: Vec<Transaction>,
    by_key: HashMap<String, Uuid>,
    windows: HashMap<Uuid, NaiveDate>,
}

/// Reference ledger that stores materialized transactions in memory.
///
/// De-duplicates on the draft's idempotency key and tracks the current window start per
/// category for budget cycles.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a manual transaction and returns its id.
    pub fn record(&self, transaction: Transaction) -> Result<Uuid, SinkError> {
        let mut state = self.write()?;
        let id = transaction.id;
        state.transactions.push(transaction);
        Ok(id)
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state
            .read()
            .map(|state| state.transactions.clone())
            .unwrap_or_default()
    }

    pub fn transactions_for_owner(&self, owner_id: Uuid) -> Vec<Transaction> {
        self.transactions()
            .into_iter()
            .filter(|txn| txn.owner_id == owner_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.transactions.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the category's current window, as last signalled by a budget reset.
    pub fn window_start(&self, category_id: Uuid) -> Option<NaiveDate> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.windows.get(&category_id).copied())
    }

    /// Spending recorded against the category since its last window reset.
    pub fn spent_since_reset(&self, category_id: Uuid) -> f64 {
        let Ok(state) = self.state.read() else {
            return 0.0;
        };
        let since = state.windows.get(&category_id).copied();
        state
            .transactions
            .iter()
            .filter(|txn| txn.category_id == Some(category_id))
            .filter(|txn| txn.kind != ObligationKind::Income)
            .filter(|txn| since.map_or(true, |start| txn.date >= start))
            .map(|txn| txn.amount.abs())
            .sum()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>, SinkError> {
        self.state
            .write()
            .map_err(|_| SinkError::Unavailable("ledger lock poisoned".into()))
    }
}

impl TransactionSink for InMemoryLedger {
    fn create_transaction(&self, draft: &TransactionDraft) -> Result<Uuid, SinkError> {
        let key = draft.idempotency_key();
        let mut state = self.write()?;
        if let Some(existing) = state.by_key.get(&key) {
            debug!(key = %key, "duplicate materialization request ignored");
            return Ok(*existing);
        }
        let transaction = Transaction::from_draft(draft);
        let id = transaction.id;
        state.transactions.push(transaction);
        state.by_key.insert(key, id);
        Ok(id)
    }
}

impl CategoryAggregator for InMemoryLedger {
    fn reset_window(&self, category_id: Uuid, window_start: NaiveDate) -> Result<(), SinkError> {
        let mut state = self.write()?;
        state.windows.insert(category_id, window_start);
        Ok(())
    }
}
