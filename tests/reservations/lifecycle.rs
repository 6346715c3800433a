//! Service Lifecycle Tests
//!
//! Startup, configuration, reset and background expiry.

use crate::common::*;
use std::io::Write;
use std::thread;
use std::time::Instant;

// ============================================================================
// Startup
// ============================================================================

#[test]
fn default_catalog_is_seeded() {
    let svc = TestService::new();
    let slots = svc.hf.slots();
    assert_eq!(slots.len(), 10);
    assert!(slots.iter().all(|s| !s.booked));
    assert_eq!(slots[9].agent_id, "agent_10");
    assert_eq!(svc.hf.slot_version("10").unwrap().unwrap().version, 0);
}

#[test]
fn from_config_file() {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "lock_ttl_ms = 2000").unwrap();
    writeln!(file, "seeded_slots = 3").unwrap();
    writeln!(file, "missing_slot_policy = \"reject\"").unwrap();
    writeln!(file, "sweep_interval_ms = 0").unwrap();

    let hf = Holdfast::from_config_file(file.path()).unwrap();
    assert_eq!(hf.config().lock_ttl, Duration::from_secs(2));
    assert_eq!(hf.slots().len(), 3);
    assert!(hf.reserve_slot_pessimistic("4").unwrap_err().is_not_found());
}

#[test]
fn invalid_config_refused() {
    let err = Holdfast::builder()
        .lock_ttl(Duration::ZERO)
        .no_sweeper()
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.status_code(), 500);

    let huge = Holdfast::builder()
        .lock_ttl(Duration::from_secs(u64::MAX))
        .no_sweeper()
        .open()
        .unwrap_err();
    assert!(matches!(huge, Error::Config(_)));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "lock_ttl_ms = \"ten\"").unwrap();
    assert!(matches!(
        Holdfast::from_config_file(file.path()).unwrap_err(),
        Error::Config(_)
    ));
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Holdfast::from_config_file(dir.path().join("holdfast.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_clears_every_subsystem() {
    let svc = TestService::new();
    let _ = svc.hf.reserve_agent("agent_1", Some("r")).unwrap();
    let _ = svc.hf.reserve_slot_optimistic("1", 0).unwrap();
    let _ = svc.hf.reserve_slot_pessimistic("2").unwrap();
    let _ = svc.hf.reserve_idempotent("k", "3").unwrap();
    let _ = svc.hf.reserve_slot_pessimistic("77").unwrap();

    svc.hf.reset();

    let stats = svc.hf.stats();
    assert_eq!(stats.locks.entries, 0);
    assert_eq!(stats.idempotency.entries, 0);
    assert_eq!(stats.agent_reservations, 0);
    assert_eq!(stats.versioned_resources, 10);
    assert_eq!(svc.hf.slots().len(), 10);
    assert!(svc.hf.slots().iter().all(|s| !s.booked));

    assert!(svc.hf.reserve_agent("agent_1", Some("r2")).unwrap().is_committed());
    assert!(svc.hf.reserve_slot_optimistic("1", 0).unwrap().is_committed());
}

#[test]
fn reset_is_safe_under_concurrent_claims() {
    let svc = TestService::new();
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let hf = svc.hf.clone();
            thread::spawn(move || {
                for n in 0..200 {
                    let slot = ((i + n) % 10 + 1).to_string();
                    let _ = hf.reserve_slot_pessimistic(&slot).unwrap();
                    let _ = hf.reserve_agent(&format!("agent_{}", slot), None).unwrap();
                }
            })
        })
        .collect();
    for _ in 0..20 {
        svc.hf.reset();
    }
    for w in workers {
        w.join().unwrap();
    }

    svc.hf.reset();
    assert_eq!(svc.hf.stats().active_holds, 0);
    assert!(svc.hf.reserve_slot_pessimistic("1").unwrap().is_committed());
}

#[test]
fn reset_never_splits_a_claim() {
    let svc = TestService::with(Holdfast::builder().seeded_slots(3).reject_unknown_slots());
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let hf = svc.hf.clone();
            thread::spawn(move || {
                for n in 0..300 {
                    let slot = ((t + n) % 3 + 1).to_string();
                    let seen = hf.slot_version(&slot).unwrap().map_or(0, |v| v.version);
                    // A seeded slot is never reported missing mid-reset
                    let _ = hf.reserve_slot_optimistic(&slot, seen).unwrap();
                }
            })
        })
        .collect();
    for _ in 0..50 {
        svc.hf.reset();
        thread::yield_now();
    }
    for w in workers {
        w.join().unwrap();
    }

    for slot in svc.hf.slots() {
        let version = svc.hf.slot_version(&slot.slot_id.to_string()).unwrap().unwrap();
        assert_eq!(version.version, slot.claims);
    }
}

#[test]
fn catalog_growth_follows_slot_policy() {
    let open = TestService::new();
    for n in 11..=60 {
        let _ = open.hf.reserve_slot_pessimistic(&n.to_string()).unwrap();
    }
    assert_eq!(open.hf.slots().len(), 60);

    let closed = TestService::with(Holdfast::builder().seeded_slots(3).reject_unknown_slots());
    for n in 4..=60 {
        assert!(closed.hf.reserve_slot_pessimistic(&n.to_string()).unwrap_err().is_not_found());
        assert!(closed.hf.reserve_slot_optimistic(&n.to_string(), 0).unwrap_err().is_not_found());
    }
    assert_eq!(closed.hf.slots().len(), 3);
    assert_eq!(closed.hf.stats().versioned_resources, 3);
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn manual_sweep_evicts_expired_locks() {
    let svc = TestService::new();
    for i in 1..=5 {
        let _ = svc.hf.reserve_agent(&format!("agent_{}", i), None).unwrap();
    }
    assert_eq!(svc.hf.sweep(), SweepReport::default());

    svc.advance(Duration::from_secs(10));
    let report = svc.hf.sweep();
    assert_eq!(report.locks, 5);
    assert_eq!(svc.hf.stats().locks.entries, 0);
    assert_eq!(svc.hf.stats().locks.expired, 5);
}

#[test]
fn background_sweeper_evicts_untouched_locks() {
    init_tracing();
    let hf = Holdfast::builder()
        .lock_ttl(Duration::from_millis(20))
        .sweep_interval(Duration::from_millis(5))
        .open()
        .unwrap();
    assert!(hf.reserve_agent("agent_1", None).unwrap().is_committed());

    let deadline = Instant::now() + Duration::from_secs(5);
    while hf.stats().locks.entries > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(hf.stats().locks.entries, 0);
    assert!(!hf.agent_status("agent_1").unwrap().locked);
}

#[test]
fn outcome_serializes_for_the_wire() {
    let svc = TestService::new();
    let committed = svc.hf.reserve_slot_pessimistic("1").unwrap();
    let json = serde_json::to_value(&committed).unwrap();
    assert_eq!(json["status"], "committed");
    assert_eq!(json["resource_key"], "slot:1");

    let _ = svc.hf.reserve_agent("agent_1", None).unwrap();
    let conflict = svc.hf.reserve_agent("agent_1", None).unwrap();
    let json = serde_json::to_value(&conflict).unwrap();
    assert_eq!(json["status"], "conflict");
    assert_eq!(json["reason"]["kind"], "lock_held");
}

// ============================================================================
// Mixed Workload
// ============================================================================

#[test]
fn random_mixed_workload_keeps_ledgers_consistent() {
    use rand::{Rng, SeedableRng};

    let svc = TestService::new();
    let threads = 6;
    let slots = 5u32;

    // Per thread: (optimistic commits, pessimistic commits) per slot
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let hf = svc.hf.clone();
            thread::spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(t as u64);
                let mut optimistic = vec![0u64; slots as usize];
                let mut pessimistic = vec![0u64; slots as usize];
                for _ in 0..300 {
                    let slot_n = rng.gen_range(1..=slots);
                    let slot = slot_n.to_string();
                    let idx = (slot_n - 1) as usize;
                    if rng.gen_bool(0.5) {
                        let seen = hf.slot_version(&slot).unwrap().unwrap().version;
                        if hf.reserve_slot_optimistic(&slot, seen).unwrap().is_committed() {
                            optimistic[idx] += 1;
                        }
                    } else if hf.reserve_slot_pessimistic(&slot).unwrap().is_committed() {
                        pessimistic[idx] += 1;
                    }
                }
                (optimistic, pessimistic)
            })
        })
        .collect();

    let mut optimistic = vec![0u64; slots as usize];
    let mut pessimistic = vec![0u64; slots as usize];
    for h in handles {
        let (o, p) = h.join().unwrap();
        for i in 0..slots as usize {
            optimistic[i] += o[i];
            pessimistic[i] += p[i];
        }
    }

    for i in 0..slots as usize {
        let slot = (i + 1).to_string();
        let version = svc.hf.slot_version(&slot).unwrap().unwrap().version;
        let claims = svc.hf.slot(&slot).unwrap().unwrap().claims;
        assert_eq!(version, optimistic[i], "slot {}", slot);
        assert_eq!(claims, optimistic[i] + pessimistic[i], "slot {}", slot);
    }
    assert_eq!(svc.hf.stats().active_holds, 0);
}
