//! Budget windows for spending categories, driven by the same recurrence rule as obligations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::collaborators::CategoryAggregator;
use crate::core::errors::{ObligationError, Result};
use crate::ledger::transaction::category_spent_in;
use crate::ledger::{DateWindow, RecurrenceRule, Transaction};

/// Tracks when a category's "spent this period" counter starts over.
///
/// Resetting signals the aggregator and never creates a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCycleTracker {
    category_id: Uuid,
    rule: RecurrenceRule,
}

impl BudgetCycleTracker {
    pub fn new(category_id: Uuid, rule: RecurrenceRule) -> Self {
        Self { category_id, rule }
    }

    pub fn category_id(&self) -> Uuid {
        self.category_id
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    pub fn should_reset(&self, now: NaiveDate) -> bool {
        self.rule.should_trigger(now) && !self.rule.should_end()
    }

    /// Starts the next window when due and returns it.
    ///
    /// The rule only advances after the aggregator accepted the new window start.
    pub fn reset_cycle(
        &mut self,
        now: NaiveDate,
        aggregator: &dyn CategoryAggregator,
    ) -> Result<Option<DateWindow>> {
        if !self.should_reset(now) {
            return Ok(None);
        }
        let advanced = self.rule.advanced(now)?;
        let window = advanced.current_window()?;
        aggregator
            .reset_window(self.category_id, window.start)
            .map_err(|err| ObligationError::Aggregator {
                category_id: self.category_id,
                message: err.to_string(),
            })?;
        self.rule = advanced;
        debug!(
            category = %self.category_id,
            start = %window.start,
            end = %window.end,
            "budget cycle reset"
        );
        Ok(Some(window))
    }

    pub fn current_window(&self) -> Result<DateWindow> {
        self.rule.current_window()
    }

    /// Expense total for this category inside the current window.
    pub fn spent_in_current_window<'a>(
        &self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<f64> {
        Ok(category_spent_in(
            transactions,
            self.category_id,
            &self.current_window()?,
        ))
    }
}

/// A spending category with a periodic budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategory {
    pub owner_id: Uuid,
    pub name: String,
    budget_amount: f64,
    cycle: BudgetCycleTracker,
}

impl BudgetCategory {
    pub fn new(
        owner_id: Uuid,
        name: impl Into<String>,
        budget_amount: f64,
        rule: RecurrenceRule,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ObligationError::Validation(
                "category name must not be blank".into(),
            ));
        }
        if !budget_amount.is_finite() || budget_amount <= 0.0 {
            return Err(ObligationError::Validation(format!(
                "budget amount must be a positive number, got {budget_amount}"
            )));
        }
        Ok(Self {
            owner_id,
            name,
            budget_amount,
            cycle: BudgetCycleTracker::new(Uuid::new_v4(), rule),
        })
    }

    pub fn id(&self) -> Uuid {
        self.cycle.category_id()
    }

    pub fn budget_amount(&self) -> f64 {
        self.budget_amount
    }

    pub fn cycle(&self) -> &BudgetCycleTracker {
        &self.cycle
    }

    pub fn cycle_mut(&mut self) -> &mut BudgetCycleTracker {
        &mut self.cycle
    }

    /// Fraction of the budget consumed by `spent`; above 1.0 means overspent.
    pub fn budget_used(&self, spent: f64) -> f64 {
        spent / self.budget_amount
    }

    pub fn usage<'a>(
        &self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<BudgetUsage> {
        let window = self.cycle.current_window()?;
        let spent = category_spent_in(transactions, self.id(), &window);
        Ok(BudgetUsage {
            category_id: self.id(),
            window,
            spent,
            budget: self.budget_amount,
            ratio: self.budget_used(spent),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetUsage {
    pub category_id: Uuid,
    pub window: DateWindow,
    pub spent: f64,
    pub budget: f64,
    pub ratio: f64,
}

impl BudgetUsage {
    pub fn remaining(&self) -> f64 {
        self.budget - self.spent
    }

    pub fn is_over_budget(&self) -> bool {
        self.spent > self.budget
    }
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub reset: Vec<(Uuid, DateWindow)>,
    pub failures: Vec<(Uuid, ObligationError)>,
    pub unchanged: usize,
}

/// Batch helpers over many budget categories.
pub struct CategoryBudgetService;

impl CategoryBudgetService {
    /// Resets every category whose cycle is due. Failures are collected per category.
    pub fn refresh(
        categories: &mut [BudgetCategory],
        now: NaiveDate,
        aggregator: &dyn CategoryAggregator,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();
        for category in categories.iter_mut() {
            let id = category.id();
            match category.cycle_mut().reset_cycle(now, aggregator) {
                Ok(Some(window)) => report.reset.push((id, window)),
                Ok(None) => report.unchanged += 1,
                Err(err) => {
                    warn!(category = %id, error = %err, "budget cycle reset failed");
                    report.failures.push((id, err));
                }
            }
        }
        report
    }

    /// Refreshes the category then reports its usage for the current window.
    pub fn usage_at<'a>(
        category: &mut BudgetCategory,
        now: NaiveDate,
        aggregator: &dyn CategoryAggregator,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<BudgetUsage> {
        category.cycle_mut().reset_cycle(now, aggregator)?;
        category.usage(transactions)
    }
}
