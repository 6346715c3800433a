//! Pessimistic Hold Tests
//!
//! Fail-fast exclusive holds around slot bookings.

use crate::common::*;
use std::sync::Barrier;
use std::thread;

#[test]
fn held_slot_rejects_then_frees() {
    let svc = TestService::new();
    let key = SlotId::new(2).unwrap().resource_key();

    let inner = svc
        .hf
        .service()
        .lock_table()
        .with_hold(&key, || svc.hf.reserve_slot_pessimistic("2").unwrap());
    let inner = inner.granted().unwrap();
    assert_eq!(inner.conflict_reason(), Some(ConflictReason::AlreadyHeld));
    assert!(!svc.hf.slot("2").unwrap().unwrap().booked);

    let fresh = svc.hf.reserve_slot_pessimistic("2").unwrap();
    assert!(fresh.is_committed());
    assert!(svc.hf.slot("2").unwrap().unwrap().booked);
}

#[test]
fn contenders_during_a_hold_all_fail_fast() {
    let svc = TestService::new();
    let key = SlotId::new(2).unwrap().resource_key();
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders + 1));

    let claim = svc.hf.service().lock_table().with_hold(&key, || {
        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let hf = svc.hf.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    hf.reserve_slot_pessimistic("2").unwrap()
                })
            })
            .collect();
        barrier.wait();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<Outcome>>()
    });

    let outcomes = claim.granted().unwrap();
    assert!(outcomes
        .iter()
        .all(|o| o.conflict_reason() == Some(ConflictReason::AlreadyHeld)));
    assert_eq!(svc.hf.stats().active_holds, 0);
}

#[test]
fn concurrent_holds_never_leak() {
    let svc = TestService::new();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let hf = svc.hf.clone();
            thread::spawn(move || {
                let slot = (i % 4 + 1).to_string();
                for _ in 0..50 {
                    let _ = hf.reserve_slot_pessimistic(&slot).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(svc.hf.stats().active_holds, 0);
    for slot in ["1", "2", "3", "4"] {
        assert!(svc.hf.reserve_slot_pessimistic(slot).unwrap().is_committed());
    }
}

#[test]
fn exclusive_booking_rejects_second_claim() {
    let svc = TestService::with(Holdfast::builder().exclusive_booking(true));
    assert!(svc.hf.reserve_slot_pessimistic("5").unwrap().is_committed());

    let again = svc.hf.reserve_slot_pessimistic("5").unwrap();
    assert_eq!(again.conflict_reason(), Some(ConflictReason::AlreadyBooked));
    assert_eq!(again.status_code(), 409);

    // The optimistic path honours the same booking
    let optimistic = svc.hf.reserve_slot_optimistic("5", 0).unwrap();
    assert_eq!(optimistic.conflict_reason(), Some(ConflictReason::AlreadyBooked));
    assert_eq!(svc.hf.slot("5").unwrap().unwrap().claims, 1);
}

#[test]
fn rebooking_allowed_without_exclusive_booking() {
    let svc = TestService::new();
    assert!(svc.hf.reserve_slot_pessimistic("6").unwrap().is_committed());
    assert!(svc.hf.reserve_slot_pessimistic("6").unwrap().is_committed());
    assert_eq!(svc.hf.slot("6").unwrap().unwrap().claims, 2);
}
