mod common;

use common::date;
use obligation_core::ledger::{Frequency, RecurrenceRule};
use obligation_core::ObligationError;

#[test]
fn single_catch_up_jumps_to_first_future_date() {
    let mut rule = RecurrenceRule::new(Frequency::Daily, 1, date(2023, 1, 1), None).unwrap();
    assert_eq!(rule.advance(date(2023, 1, 5)).unwrap(), date(2023, 1, 6));
}

#[test]
fn month_end_clamps_to_february() {
    let mut rule = RecurrenceRule::new(Frequency::Monthly, 1, date(2023, 1, 31), None).unwrap();
    assert_eq!(rule.advance(date(2023, 2, 15)).unwrap(), date(2023, 2, 28));
    assert_eq!(rule.advance(date(2023, 2, 28)).unwrap(), date(2023, 3, 31));
}

#[test]
fn terminal_boundary_is_a_status() {
    let mut rule = RecurrenceRule::new(
        Frequency::Daily,
        1,
        date(2023, 1, 1),
        Some(date(2023, 1, 10)),
    )
    .unwrap();
    rule.advance(date(2023, 1, 9)).unwrap();
    assert!(!rule.should_end());
    rule.advance(date(2023, 1, 10)).unwrap();
    assert_eq!(rule.next_trigger_date(), date(2023, 1, 11));
    assert!(rule.should_end());
}

#[test]
fn advance_is_monotonic_and_lands_after_now() {
    let starts = [date(2020, 1, 31), date(2020, 2, 29), date(2021, 7, 15)];
    let checkpoints = [
        date(2020, 3, 1),
        date(2021, 2, 28),
        date(2024, 2, 29),
        date(2031, 12, 31),
    ];
    for frequency in Frequency::ALL {
        for interval in [1, 2, 5] {
            for start in starts {
                let mut rule = RecurrenceRule::new(frequency, interval, start, None).unwrap();
                for now in checkpoints {
                    let before = rule.next_trigger_date();
                    let after = rule.advance(now).unwrap();
                    assert!(after >= before, "{frequency} x{interval} from {start} went backwards");
                    assert!(after > now, "{frequency} x{interval} from {start} stuck at {after}");
                }
            }
        }
    }
}

#[test]
fn catch_up_matches_step_by_step_walk() {
    for frequency in Frequency::ALL {
        let start = date(2019, 1, 31);
        let now = date(2024, 6, 30);
        let mut jumped = RecurrenceRule::new(frequency, 3, start, None).unwrap();
        jumped.advance(now).unwrap();

        let mut walked = RecurrenceRule::new(frequency, 3, start, None).unwrap();
        while walked.next_trigger_date() <= now {
            let current = walked.next_trigger_date();
            walked.advance(current).unwrap();
        }
        assert_eq!(jumped.next_trigger_date(), walked.next_trigger_date(), "{frequency}");
    }
}

#[test]
fn trigger_check_is_side_effect_free() {
    let rule = RecurrenceRule::new(Frequency::Weekly, 1, date(2024, 1, 1), None).unwrap();
    let now = date(2024, 1, 3);
    assert_eq!(rule.should_trigger(now), rule.should_trigger(now));
    assert_eq!(rule.next_trigger_date(), date(2024, 1, 1));
}

#[test]
fn serialized_shape_is_stable() {
    let mut rule = RecurrenceRule::new(
        Frequency::Monthly,
        1,
        date(2024, 1, 31),
        Some(date(2024, 12, 31)),
    )
    .unwrap();
    rule.advance(date(2024, 2, 1)).unwrap();
    let json = serde_json::to_string(&rule).unwrap();
    insta::assert_snapshot!(json, @r#"{"frequency":"Monthly","interval":1,"startDate":"2024-01-31","nextTriggerDate":"2024-02-29","endDate":"2024-12-31"}"#);

    let open = RecurrenceRule::new(Frequency::Weekly, 2, date(2024, 1, 1), None).unwrap();
    insta::assert_snapshot!(serde_json::to_string(&open).unwrap(), @r#"{"frequency":"Weekly","interval":2,"startDate":"2024-01-01","nextTriggerDate":"2024-01-01"}"#);
}

#[test]
fn round_trip_preserves_behaviour() {
    let mut original =
        RecurrenceRule::new(Frequency::Yearly, 1, date(2024, 2, 29), Some(date(2030, 1, 1)))
            .unwrap();
    original.advance(date(2024, 3, 1)).unwrap();
    let json = serde_json::to_string(&original).unwrap();
    let mut restored: obligation_core::ledger::RecurrenceRule = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, original);
    let now = date(2027, 6, 1);
    assert_eq!(restored.should_trigger(now), original.should_trigger(now));
    assert_eq!(restored.should_end(), original.should_end());
    assert_eq!(restored.advance(now).unwrap(), original.advance(now).unwrap());
    assert_eq!(restored.next_trigger_date(), date(2028, 2, 29));
}

#[test]
fn invalid_stored_rules_fail_to_load() {
    let unknown = r#"{"frequency":"Fortnightly","interval":1,"startDate":"2024-01-01","nextTriggerDate":"2024-01-01"}"#;
    let err = serde_json::from_str::<RecurrenceRule>(unknown).unwrap_err();
    assert!(err.to_string().contains("Fortnightly"));

    let negative = r#"{"frequency":"Daily","interval":-3,"startDate":"2024-01-01","nextTriggerDate":"2024-01-01"}"#;
    assert!(serde_json::from_str::<RecurrenceRule>(negative).is_err());

    let backwards = r#"{"frequency":"Daily","interval":1,"startDate":"2024-01-05","nextTriggerDate":"2024-01-01"}"#;
    assert!(serde_json::from_str::<RecurrenceRule>(backwards).is_err());
}

#[test]
fn frequency_parse_errors_are_typed() {
    let err = "Biweekly".parse::<Frequency>().unwrap_err();
    assert!(matches!(err, ObligationError::UnsupportedFrequency(_)));
}
