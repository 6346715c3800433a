//! Idempotent Claim Tests
//!
//! Repeated submissions under one key run once and replay the first outcome.

use crate::common::*;
use std::sync::Barrier;
use std::thread;

#[test]
fn concurrent_submissions_execute_once() {
    let svc = TestService::new();
    let callers = 16;
    let barrier = Arc::new(Barrier::new(callers));
    let key = unique_key("checkout");

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let hf = svc.hf.clone();
            let barrier = Arc::clone(&barrier);
            let key = key.clone();
            thread::spawn(move || {
                barrier.wait();
                hf.reserve_idempotent(&key, "3").unwrap()
            })
        })
        .collect();
    let outcomes: Vec<Outcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(outcomes[0].is_committed());
    assert!(outcomes.iter().all(|o| *o == outcomes[0]));
    assert_eq!(svc.hf.slot("3").unwrap().unwrap().claims, 1);

    let stats = svc.hf.stats().idempotency;
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.replays, callers as u64 - 1);
}

#[test]
fn replay_survives_later_bookings() {
    let svc = TestService::new();
    let first = svc.hf.reserve_idempotent("order-1", "4").unwrap();
    assert!(svc.hf.reserve_slot_pessimistic("4").unwrap().is_committed());

    // Same key, even with a different slot, replays the recorded outcome
    let replay = svc.hf.reserve_idempotent("order-1", "5").unwrap();
    assert_eq!(replay, first);
    assert!(!svc.hf.slot("5").unwrap().unwrap().booked);
}

#[test]
fn distinct_keys_execute_independently() {
    let svc = TestService::new();
    for i in 0..5 {
        let key = format!("order-{}", i);
        assert!(svc.hf.reserve_idempotent(&key, "6").unwrap().is_committed());
    }
    assert_eq!(svc.hf.slot("6").unwrap().unwrap().claims, 5);
    assert_eq!(svc.hf.stats().idempotency.entries, 5);
}

#[test]
fn conflicts_are_replayed_too() {
    let svc = TestService::with(Holdfast::builder().exclusive_booking(true));
    assert!(svc.hf.reserve_slot_pessimistic("7").unwrap().is_committed());

    let first = svc.hf.reserve_idempotent("late", "7").unwrap();
    assert_eq!(first.conflict_reason(), Some(ConflictReason::AlreadyBooked));

    // The key stays bound to the conflict even though slot 8 is free
    assert_eq!(svc.hf.reserve_idempotent("late", "8").unwrap(), first);
    assert!(!svc.hf.slot("8").unwrap().unwrap().booked);

    svc.hf.reset();
    assert!(svc.hf.reserve_slot_pessimistic("7").unwrap().is_committed());
    assert!(svc.hf.reserve_idempotent("late", "8").unwrap().is_committed());
}

#[test]
fn records_expire_after_retention() {
    let svc = TestService::with(Holdfast::builder().idempotency_ttl(Duration::from_secs(60)));
    let first = svc.hf.reserve_idempotent("k", "1").unwrap();

    svc.advance(Duration::from_secs(59));
    assert_eq!(svc.hf.reserve_idempotent("k", "1").unwrap(), first);

    svc.advance(Duration::from_secs(1));
    assert_eq!(svc.hf.sweep().idempotency, 1);
    assert!(svc.hf.reserve_idempotent("k", "1").unwrap().is_committed());
    assert_eq!(svc.hf.slot("1").unwrap().unwrap().claims, 2);
}

#[test]
fn capacity_bounds_retained_records() {
    let svc = TestService::with(Holdfast::builder().idempotency_capacity(3));
    for i in 0..10 {
        let _ = svc.hf.reserve_idempotent(&format!("k{}", i), "2").unwrap();
    }
    assert!(svc.hf.stats().idempotency.entries <= 3);
    assert!(svc.hf.stats().idempotency.evictions >= 7);
}

#[test]
fn rejected_request_is_not_recorded() {
    let svc = TestService::with(Holdfast::builder().reject_unknown_slots());
    assert!(svc.hf.reserve_idempotent("k", "99").unwrap_err().is_not_found());
    assert!(svc.hf.reserve_idempotent("", "1").unwrap_err().is_invalid_input());
    assert_eq!(svc.hf.stats().idempotency.entries, 0);

    assert!(svc.hf.reserve_idempotent("k", "1").unwrap().is_committed());
}

#[test]
fn idempotent_optimistic_claim() {
    let svc = TestService::new();
    let request = ClaimRequest::optimistic("9", 0).with_idempotency_key("opt-9");

    let first = svc.hf.claim(&request).unwrap();
    let retry = svc.hf.claim(&request).unwrap();
    assert!(first.is_committed());
    assert_eq!(retry, first);
    assert_eq!(svc.hf.slot_version("9").unwrap().unwrap().version, 1);
}
