pub mod budget_cycle;
pub mod recurring_service;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use budget_cycle::{
    BudgetCategory, BudgetCycleTracker, BudgetUsage, CategoryBudgetService, RefreshReport,
};
pub use recurring_service::{ObligationLocks, RecurringService};
pub use scheduler::{MaterializationScheduler, MaterializedEntry, ProcessFailure, ProcessReport};
