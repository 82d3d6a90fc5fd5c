mod common;

use std::sync::Arc;

use common::{date, expense_draft};
use obligation_core::core::services::{BudgetCategory, CategoryBudgetService, RecurringService};
use obligation_core::core::time::{Clock, FixedClock};
use obligation_core::ledger::{Frequency, InMemoryLedger, RecurrenceRule};
use obligation_core::storage::InMemoryObligationRepository;
use uuid::Uuid;

#[test]
fn materialized_expenses_count_against_category_window() {
    let owner = Uuid::new_v4();
    let ledger = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(FixedClock::at_date(date(2024, 3, 3)));
    let service = RecurringService::new(
        Arc::new(InMemoryObligationRepository::new()),
        ledger.clone(),
        clock.clone(),
    );

    let rule = RecurrenceRule::new(Frequency::Monthly, 1, date(2024, 1, 1), None).unwrap();
    let mut bills = BudgetCategory::new(owner, "Bills", 100.0, rule).unwrap();

    let mut draft = expense_draft(owner, "Insurance", "Weekly", date(2024, 3, 1));
    draft.category_id = Some(bills.id());
    service.create(draft).unwrap();
    service.list_for_owner(owner).unwrap();

    let usage = CategoryBudgetService::usage_at(
        &mut bills,
        clock.today(),
        ledger.as_ref(),
        &ledger.transactions(),
    )
    .unwrap();

    assert_eq!(usage.window.start, date(2024, 3, 1));
    assert_eq!(usage.spent, 25.0);
    assert_eq!(usage.ratio, 0.25);
    assert_eq!(ledger.window_start(bills.id()), Some(date(2024, 3, 1)));
    assert_eq!(ledger.spent_since_reset(bills.id()), 25.0);
}

#[test]
fn budget_window_rolls_over_without_transactions() {
    let ledger = InMemoryLedger::new();
    let rule = RecurrenceRule::new(Frequency::Weekly, 2, date(2024, 1, 1), None).unwrap();
    let mut fun = BudgetCategory::new(Uuid::new_v4(), "Fun", 60.0, rule).unwrap();

    let first = CategoryBudgetService::refresh(std::slice::from_mut(&mut fun), date(2024, 1, 1), &ledger);
    assert_eq!(first.reset.len(), 1);
    assert_eq!(fun.cycle().current_window().unwrap().start, date(2024, 1, 1));
    assert_eq!(fun.cycle().current_window().unwrap().end, date(2024, 1, 15));

    let later = CategoryBudgetService::refresh(std::slice::from_mut(&mut fun), date(2024, 2, 20), &ledger);
    assert_eq!(later.reset.len(), 1);
    assert_eq!(fun.cycle().current_window().unwrap().start, date(2024, 2, 12));
    assert!(ledger.is_empty());
}

#[test]
fn ended_budget_cycle_stops_resetting() {
    let ledger = InMemoryLedger::new();
    let rule = RecurrenceRule::new(
        Frequency::Monthly,
        1,
        date(2024, 1, 1),
        Some(date(2024, 2, 1)),
    )
    .unwrap();
    let mut seasonal = BudgetCategory::new(Uuid::new_v4(), "Holidays", 500.0, rule).unwrap();

    CategoryBudgetService::refresh(std::slice::from_mut(&mut seasonal), date(2024, 2, 5), &ledger);
    assert!(seasonal.cycle().rule().should_end());
    let report =
        CategoryBudgetService::refresh(std::slice::from_mut(&mut seasonal), date(2024, 6, 1), &ledger);
    assert_eq!(report.unchanged, 1);
    assert!(report.failures.is_empty());
}
