//! Narrow seams through which the engine reaches the outside ledger.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::transaction::TransactionDraft;

/// Failure reported by a collaborator. The engine never retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Creates the concrete one-time record for a due obligation.
///
/// Implementations receive [`TransactionDraft::idempotency_key`] and should use it to make
/// repeated requests for the same trigger date harmless.
pub trait TransactionSink: Send + Sync {
    fn create_transaction(&self, draft: &TransactionDraft) -> Result<Uuid, SinkError>;
}

/// Owns the per-category "spent this period" counter.
pub trait CategoryAggregator: Send + Sync {
    /// Starts a fresh accumulation window beginning at `window_start`.
    fn reset_window(&self, category_id: Uuid, window_start: NaiveDate) -> Result<(), SinkError>;
}
