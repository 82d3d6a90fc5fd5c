use std::result::Result as StdResult;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Unified error type for rule, obligation, service, and storage layers.
#[derive(Error, Debug)]
pub enum ObligationError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unsupported frequency: {0}")]
    UnsupportedFrequency(String),
    #[error("Obligation not found: {0}")]
    NotFound(Uuid),
    #[error("Obligation {id} was modified concurrently (expected next trigger {expected}, found {found})")]
    Conflict {
        id: Uuid,
        expected: NaiveDate,
        found: NaiveDate,
    },
    #[error("Transaction creation failed for obligation {obligation_id}: {message}")]
    Sink { obligation_id: Uuid, message: String },
    #[error("Budget window reset failed for category {category_id}: {message}")]
    Aggregator { category_id: Uuid, message: String },
    #[error("Persistence error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ObligationError {
    /// Returns `true` for failures the caller should answer by re-reading and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ObligationError::Conflict { .. })
    }
}

pub type Result<T> = StdResult<T, ObligationError>;

impl From<std::io::Error> for ObligationError {
    fn from(err: std::io::Error) -> Self {
        ObligationError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ObligationError {
    fn from(err: serde_json::Error) -> Self {
        ObligationError::StorageError(err.to_string())
    }
}
