//! Domain models: calendar units, recurrence rules, obligations and materialized transactions.

pub mod obligation;
pub mod recurrence;
pub mod time_interval;
pub mod transaction;

pub use obligation::{
    MaterializeOutcome, ObligationDraft, ObligationKind, ObligationStatus, RecurringObligation,
    RuleChanges,
};
pub use recurrence::{RecurrenceRule, RuleSpec};
pub use time_interval::{DateWindow, Frequency};
pub use transaction::{InMemoryLedger, Transaction, TransactionDraft};
