//! Optimistic Version Tests
//!
//! Slot bookings committed against the version the caller read.

use crate::common::*;
use std::sync::Barrier;
use std::thread;

#[test]
fn slot_one_version_sequence() {
    let svc = TestService::new();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let hf = svc.hf.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                hf.reserve_slot_optimistic("1", 0).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<Outcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_committed()).count(), 1);
    let loser = outcomes.iter().find(|o| o.is_conflict()).unwrap();
    assert_eq!(
        loser.conflict_reason(),
        Some(ConflictReason::VersionMismatch {
            expected: 0,
            actual: 1
        })
    );
    assert_eq!(svc.hf.slot_version("1").unwrap().unwrap().version, 1);

    // A caller that never re-read still loses
    assert!(svc.hf.reserve_slot_optimistic("1", 0).unwrap().is_conflict());
    assert!(svc.hf.reserve_slot_optimistic("1", 1).unwrap().is_committed());
    assert_eq!(svc.hf.slot_version("1").unwrap().unwrap().version, 2);
}

#[test]
fn version_increments_once_per_winner() {
    let svc = TestService::new();
    let handles: Vec<_> = (0..24)
        .map(|_| {
            let hf = svc.hf.clone();
            thread::spawn(move || hf.reserve_slot_optimistic("7", 0).unwrap().is_committed())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(svc.hf.slot_version("7").unwrap().unwrap().version, 1);
    assert_eq!(svc.hf.slot("7").unwrap().unwrap().claims, 1);
}

#[test]
fn retrying_callers_all_eventually_commit() {
    let svc = TestService::new();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let hf = svc.hf.clone();
            thread::spawn(move || loop {
                let seen = hf.slot_version("3").unwrap().unwrap().version;
                if hf.reserve_slot_optimistic("3", seen).unwrap().is_committed() {
                    break;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(svc.hf.slot_version("3").unwrap().unwrap().version, 8);
    assert_eq!(svc.hf.slot("3").unwrap().unwrap().claims, 8);
}

#[test]
fn committed_slot_records_booking() {
    let svc = TestService::new();
    let outcome = svc.hf.reserve_slot_optimistic("4", 0).unwrap();
    let slot = svc.hf.slot("4").unwrap().unwrap();

    assert!(slot.booked);
    assert_eq!(slot.agent_id, "agent_4");
    match outcome {
        Outcome::Committed {
            resource_key,
            assigned_at,
        } => {
            assert_eq!(resource_key.as_str(), "slot:4");
            assert_eq!(slot.booked_at, Some(assigned_at));
        }
        other => panic!("expected commit, got {:?}", other),
    }
}

#[test]
fn unknown_slot_auto_initializes_by_default() {
    let svc = TestService::new();
    assert!(svc.hf.slot_version("42").unwrap().is_none());
    assert!(svc.hf.reserve_slot_optimistic("42", 0).unwrap().is_committed());
    assert_eq!(svc.hf.slot_version("42").unwrap().unwrap().version, 1);
}

#[test]
fn unknown_slot_rejected_when_configured() {
    let svc = TestService::with(Holdfast::builder().reject_unknown_slots());
    let err = svc.hf.reserve_slot_optimistic("11", 0).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status_code(), 404);
    assert!(svc.hf.slot_version("11").unwrap().is_none());
}

#[test]
fn malformed_slot_is_invalid_input() {
    let svc = TestService::new();
    for slot in ["", "0", "one", "-3", "1.5"] {
        assert!(
            svc.hf.reserve_slot_optimistic(slot, 0).unwrap_err().is_invalid_input(),
            "slot {:?}",
            slot
        );
    }
}
