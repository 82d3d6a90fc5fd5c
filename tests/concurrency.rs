mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use common::{date, expense_draft, setup_test_env};
use obligation_core::core::services::RecurringService;
use obligation_core::core::time::FixedClock;
use obligation_core::ledger::{
    Frequency, InMemoryLedger, ObligationKind, RecurrenceRule, RecurringObligation,
};
use obligation_core::storage::{InMemoryObligationRepository, JsonObligationStore, ObligationRepository};
use obligation_core::ObligationError;
use uuid::Uuid;

const THREADS: usize = 8;
const HANDLES: usize = 4;
const ROUNDS: usize = 20;

#[test]
fn racing_passes_materialize_once_in_memory() {
    let ledger = Arc::new(InMemoryLedger::new());
    let service = Arc::new(RecurringService::new(
        Arc::new(InMemoryObligationRepository::new()),
        ledger.clone(),
        Arc::new(FixedClock::at_date(date(2024, 7, 1))),
    ));
    let owner = Uuid::new_v4();
    for title in ["Rent", "Phone", "Cloud"] {
        service
            .create(expense_draft(owner, title, "Monthly", date(2024, 1, 1)))
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.process_owner(owner).unwrap()
            })
        })
        .collect();

    let materialized: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().materialized_count())
        .sum();

    assert_eq!(materialized, 3);
    assert_eq!(ledger.len(), 3);
    for obligation in service.list_for_owner(owner).unwrap() {
        assert_eq!(obligation.next_trigger_date(), date(2024, 8, 1));
    }
}

#[test]
fn racing_services_on_shared_json_store_never_double_advance() {
    let env = setup_test_env(date(2024, 7, 1));
    let owner = Uuid::new_v4();
    env.service
        .create(expense_draft(owner, "Mortgage", "Weekly", date(2024, 6, 3)))
        .unwrap();

    // Separate services share the store but not the lock registry.
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = RecurringService::new(
                env.store.clone(),
                env.ledger.clone(),
                env.clock.clone(),
            );
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.process_owner(owner).unwrap()
            })
        })
        .collect();

    let reports: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    let failures: usize = reports.iter().map(|report| report.failures.len()).sum();
    let recoverable: usize = reports
        .iter()
        .map(|report| report.recoverable_failures().count())
        .sum();

    assert_eq!(failures, recoverable, "only CAS conflicts are expected");
    assert_eq!(env.ledger.len(), 1);
    let stored = env.service.list_for_owner(owner).unwrap();
    assert_eq!(stored[0].next_trigger_date(), date(2024, 7, 8));
    assert_eq!(env.ledger.len(), 1);
}

#[test]
fn separately_opened_json_stores_let_one_writer_win() {
    let base = common::temp_base();
    let ledger = Arc::new(InMemoryLedger::new());
    let seed = JsonObligationStore::new(Some(base.clone()), Some(2)).unwrap();
    let owner = Uuid::new_v4();

    for round in 0..ROUNDS {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, date(2024, 1, 1), None).unwrap();
        let record = RecurringObligation::new(
            owner,
            ObligationKind::Expense,
            format!("Bill {round}"),
            10.0,
            rule,
            Utc::now(),
        )
        .unwrap();
        seed.insert(&record).unwrap();

        let barrier = Arc::new(Barrier::new(HANDLES));
        let writers: Vec<_> = (0..HANDLES)
            .map(|_| {
                let store = JsonObligationStore::new(Some(base.clone()), Some(2)).unwrap();
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let id = record.id;
                thread::spawn(move || {
                    let mut copy = store.get(id).unwrap().unwrap();
                    let expected = copy.next_trigger_date();
                    copy.materialize(date(2024, 1, 1), ledger.as_ref()).unwrap();
                    barrier.wait();
                    store.persist(&copy, expected)
                })
            })
            .collect();

        let results: Vec<_> = writers
            .into_iter()
            .map(|writer| writer.join().unwrap())
            .collect();
        let wins = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(wins, 1, "round {round}: {results:?}");
        assert!(results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(ObligationError::is_recoverable));
        let stored = seed.get(record.id).unwrap().unwrap();
        assert_eq!(stored.next_trigger_date(), date(2024, 1, 2));
    }

    assert_eq!(ledger.len(), ROUNDS);
}
