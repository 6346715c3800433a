//! Reservation service
//!
//! Routes claims to the concurrency strategy that arbitrates them and
//! records what the winner got.
//!
//! | Strategy            | Resource | Arbitrated by                |
//! |---------------------|----------|------------------------------|
//! | `DistributedLock`   | agent    | [`DistributedLockManager`]   |
//! | `Optimistic`        | slot     | [`OptimisticVersionStore`]   |
//! | `Pessimistic`       | slot     | [`PessimisticLockTable`]     |
//!
//! Any claim may carry an idempotency key, in which case it runs through
//! the [`IdempotencyCache`] and repeated submissions replay the first
//! outcome.
//!
//! Every parameter is validated before a subsystem is touched, so a
//! malformed request never leaves partial state behind. Conflicts are
//! returned as [`Outcome::Conflict`]; `Err` is reserved for requests that
//! could never succeed.

use crate::config::ReservationConfig;
use crate::request::{ClaimRequest, Strategy};
use crate::slots::{Slot, SlotBook};
use crate::sweeper::Sweeper;
use chrono::{DateTime, Utc};
use holdfast_concurrency::{
    DistributedLockManager, IdempotencyCache, IdempotencyStats, LockManagerStats,
    OptimisticVersionStore, PessimisticLockTable, ShardedMap, Sweep, VersionedResource,
};
use holdfast_core::{
    Claim, Clock, Error, IdempotencyKey, LockToken, Outcome, ResourceKey, Result, SlotId,
    SystemClock,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const AGENT_NAMESPACE: &str = "agent";

/// A recorded agent reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReservation {
    /// Token the winning claim held the agent lock with
    pub request_id: LockToken,
    /// When the reservation was recorded
    pub reserved_at: DateTime<Utc>,
}

/// Reservation and lock state of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent id
    pub agent_id: String,
    /// Whether a reservation has been recorded
    pub reserved: bool,
    /// Whether a live lock is currently held
    pub locked: bool,
    /// Token of the recorded reservation
    pub request_id: Option<LockToken>,
}

/// Entries removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired agent locks
    pub locks: usize,
    /// Expired idempotency records
    pub idempotency: usize,
}

impl SweepReport {
    /// Total entries removed
    pub fn total(&self) -> usize {
        self.locks + self.idempotency
    }
}

/// Point-in-time service statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Agent lock counters
    pub locks: LockManagerStats,
    /// Idempotency cache counters
    pub idempotency: IdempotencyStats,
    /// Resources tracked by the version store
    pub versioned_resources: usize,
    /// Pessimistic holds currently in effect
    pub active_holds: usize,
    /// Recorded agent reservations
    pub agent_reservations: usize,
}

/// A validated claim, ready to run
#[derive(Debug)]
enum PreparedClaim {
    Agent {
        agent_id: String,
        key: ResourceKey,
        token: LockToken,
    },
    Optimistic {
        slot_id: SlotId,
        key: ResourceKey,
        expected: u64,
    },
    Pessimistic {
        slot_id: SlotId,
        key: ResourceKey,
    },
}

impl PreparedClaim {
    fn strategy(&self) -> Strategy {
        match self {
            PreparedClaim::Agent { .. } => Strategy::DistributedLock,
            PreparedClaim::Optimistic { .. } => Strategy::Optimistic,
            PreparedClaim::Pessimistic { .. } => Strategy::Pessimistic,
        }
    }
}

/// The reservation service
///
/// # Thread Safety
///
/// All methods take `&self`; share the service across threads with `Arc`.
/// Each subsystem arbitrates its own keys, so claims on different
/// resources proceed in parallel. Claims share a read lock that
/// [`reset`](Self::reset) takes exclusively, so a reset waits for claims
/// in progress and no claim observes a half-reset state.
///
/// # Growth
///
/// Agent reservations and auto-initialised slots are kept until
/// [`reset`](Self::reset). Under [`MissingKeyPolicy::AutoInit`] every
/// distinct agent id and slot number claimed adds an entry, so a service
/// exposed to arbitrary ids should run with
/// [`MissingKeyPolicy::Reject`] or reset periodically.
///
/// [`MissingKeyPolicy::AutoInit`]: holdfast_concurrency::MissingKeyPolicy::AutoInit
/// [`MissingKeyPolicy::Reject`]: holdfast_concurrency::MissingKeyPolicy::Reject
///
/// # Example
///
/// ```
/// use holdfast_engine::{ReservationConfig, ReservationService};
///
/// let service = ReservationService::new(ReservationConfig::default()).unwrap();
/// let first = service.reserve_slot_optimistic("1", 0).unwrap();
/// let stale = service.reserve_slot_optimistic("1", 0).unwrap();
/// assert!(first.is_committed());
/// assert!(stale.is_conflict());
/// ```
#[derive(Debug)]
pub struct ReservationService {
    config: ReservationConfig,
    clock: Arc<dyn Clock>,
    locks: Arc<DistributedLockManager>,
    versions: OptimisticVersionStore,
    holds: PessimisticLockTable,
    idempotency: Arc<IdempotencyCache>,
    slots: SlotBook,
    agents: ShardedMap<String, AgentReservation>,
    reset_gate: RwLock<()>,
    sweeper: Option<Sweeper>,
}

impl ReservationService {
    /// Start a service on the system clock
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration, [`Error::Io`] if the
    /// sweeper thread cannot be started.
    pub fn new(config: ReservationConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Start a service on `clock`
    pub fn with_clock(config: ReservationConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let locks = Arc::new(DistributedLockManager::new(Arc::clone(&clock)));
        let idempotency = Arc::new(IdempotencyCache::new(
            config.idempotency_retention(),
            Arc::clone(&clock),
        ));
        let sweeper = if config.sweep_interval.is_zero() {
            None
        } else {
            let targets: Vec<Arc<dyn Sweep>> = vec![
                Arc::clone(&locks) as Arc<dyn Sweep>,
                Arc::clone(&idempotency) as Arc<dyn Sweep>,
            ];
            Some(Sweeper::spawn(config.sweep_interval, targets)?)
        };

        let service = Self {
            versions: OptimisticVersionStore::new(config.missing_slot_policy, Arc::clone(&clock)),
            holds: PessimisticLockTable::new(),
            slots: SlotBook::new(config.seeded_slots, config.missing_slot_policy),
            agents: ShardedMap::default(),
            reset_gate: RwLock::new(()),
            locks,
            idempotency,
            sweeper,
            clock,
            config,
        };
        service.seed_versions();

        info!(
            seeded_slots = service.config.seeded_slots,
            lock_ttl_ms = service.config.lock_ttl.as_millis() as u64,
            exclusive_booking = service.config.exclusive_booking,
            "reservation service started"
        );
        Ok(service)
    }

    fn seed_versions(&self) {
        for slot_id in self.slots.seeded_ids() {
            self.versions.seed(slot_id.resource_key());
        }
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Reserve an agent under a TTL lock
    ///
    /// `request_id` becomes the lock token; one is generated when absent.
    /// The lock is held until its TTL lapses, or released right away when
    /// `release_after_reserve` is set.
    pub fn reserve_agent(&self, agent_id: &str, request_id: Option<&str>) -> Result<Outcome> {
        let prepared = self.prepare_agent(agent_id, request_id)?;
        self.execute(prepared)
    }

    /// Release an agent lock held under `request_id`
    ///
    /// The recorded reservation is kept. A caller that does not hold the
    /// lock gets `Conflict(NotHolder)`.
    pub fn release_agent(&self, agent_id: &str, request_id: &str) -> Result<Outcome> {
        let key = agent_key(agent_id)?;
        let token = LockToken::from_request_id(request_id)?;
        let _claims = self.reset_gate.read();
        Ok(match self.locks.release(&key, &token) {
            Claim::Granted(()) => {
                debug!(agent = agent_id, "agent lock released");
                Outcome::committed(key, self.clock.wall())
            }
            Claim::Conflict(reason) => Outcome::conflict(reason),
        })
    }

    /// Book a slot if its version still equals `expected_version`
    pub fn reserve_slot_optimistic(&self, slot: &str, expected_version: u64) -> Result<Outcome> {
        let slot_id = self.resolve_slot(slot)?;
        self.execute(PreparedClaim::Optimistic {
            slot_id,
            key: slot_id.resource_key(),
            expected: expected_version,
        })
    }

    /// Book a slot under an exclusive, fail-fast hold
    pub fn reserve_slot_pessimistic(&self, slot: &str) -> Result<Outcome> {
        let slot_id = self.resolve_slot(slot)?;
        self.execute(PreparedClaim::Pessimistic {
            slot_id,
            key: slot_id.resource_key(),
        })
    }

    /// Book a slot at most once per idempotency key
    ///
    /// Concurrent submissions under one key share a single execution.
    pub fn reserve_idempotent(&self, idempotency_key: &str, slot: &str) -> Result<Outcome> {
        self.claim(&ClaimRequest::pessimistic(slot).with_idempotency_key(idempotency_key))
    }

    /// Dispatch a claim request to its strategy
    ///
    /// # Errors
    ///
    /// [`Error::InvalidResource`] or [`Error::InvalidParameter`] for a
    /// malformed request, [`Error::NotFound`] for a slot outside the
    /// catalog when unknown slots are rejected.
    pub fn claim(&self, request: &ClaimRequest) -> Result<Outcome> {
        let prepared = self.prepare(request)?;
        match &request.idempotency_key {
            None => self.execute(prepared),
            Some(raw) => {
                let key = IdempotencyKey::new(raw.as_str())?;
                self.idempotency
                    .try_execute_once(&key, || self.execute(prepared))
            }
        }
    }

    fn prepare(&self, request: &ClaimRequest) -> Result<PreparedClaim> {
        match request.strategy {
            Strategy::DistributedLock => {
                if request.expected_version.is_some() {
                    return Err(Error::invalid_parameter(
                        "expected_version",
                        "only optimistic claims carry a version",
                    ));
                }
                self.prepare_agent(&request.resource, request.request_id.as_deref())
            }
            Strategy::Optimistic => {
                reject_request_id(request)?;
                let slot_id = self.resolve_slot(&request.resource)?;
                Ok(PreparedClaim::Optimistic {
                    slot_id,
                    key: slot_id.resource_key(),
                    expected: request.expected_version.unwrap_or(0),
                })
            }
            Strategy::Pessimistic => {
                reject_request_id(request)?;
                if request.expected_version.is_some() {
                    return Err(Error::invalid_parameter(
                        "expected_version",
                        "only optimistic claims carry a version",
                    ));
                }
                let slot_id = self.resolve_slot(&request.resource)?;
                Ok(PreparedClaim::Pessimistic {
                    slot_id,
                    key: slot_id.resource_key(),
                })
            }
        }
    }

    fn prepare_agent(&self, agent_id: &str, request_id: Option<&str>) -> Result<PreparedClaim> {
        let key = agent_key(agent_id)?;
        let token = match request_id {
            Some(raw) => LockToken::from_request_id(raw)?,
            None => LockToken::generate(),
        };
        Ok(PreparedClaim::Agent {
            agent_id: agent_id.to_string(),
            key,
            token,
        })
    }

    fn resolve_slot(&self, slot: &str) -> Result<SlotId> {
        let slot_id: SlotId = slot.parse()?;
        self.slots.resolve(slot_id)?;
        Ok(slot_id)
    }

    fn execute(&self, prepared: PreparedClaim) -> Result<Outcome> {
        let strategy = prepared.strategy();
        let _claims = self.reset_gate.read();
        let outcome = match prepared {
            PreparedClaim::Agent {
                agent_id,
                key,
                token,
            } => match self.locks.acquire_as(&key, token, self.config.lock_ttl)? {
                Claim::Granted(token) => {
                    let reserved_at = self.clock.wall();
                    self.agents.insert(
                        agent_id,
                        AgentReservation {
                            request_id: token.clone(),
                            reserved_at,
                        },
                    );
                    if self.config.release_after_reserve {
                        let _ = self.locks.release(&key, &token);
                    }
                    Outcome::committed(key, reserved_at)
                }
                Claim::Conflict(reason) => Outcome::conflict(reason),
            },
            PreparedClaim::Optimistic {
                slot_id,
                key,
                expected,
            } => {
                let at = self.clock.wall();
                let exclusive = self.config.exclusive_booking;
                let claim = self.slots.book_with(slot_id, at, exclusive, || {
                    if exclusive {
                        self.versions.claim(&key, expected)
                    } else {
                        self.versions.commit(&key, expected)
                    }
                })?;
                match claim {
                    Claim::Granted(_version) => Outcome::committed(key, at),
                    Claim::Conflict(reason) => Outcome::conflict(reason),
                }
            }
            PreparedClaim::Pessimistic { slot_id, key } => {
                let exclusive = self.config.exclusive_booking;
                let claim = self
                    .holds
                    .with_hold(&key, || self.slots.book(slot_id, self.clock.wall(), exclusive))
                    .and_then(|booked| booked);
                match claim {
                    Claim::Granted(at) => Outcome::committed(key, at),
                    Claim::Conflict(reason) => Outcome::conflict(reason),
                }
            }
        };

        match outcome.conflict_reason() {
            None => debug!(strategy = %strategy, "claim committed"),
            Some(reason) => debug!(strategy = %strategy, %reason, "claim conflicted"),
        }
        Ok(outcome)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Reservation and lock state of an agent
    pub fn agent_status(&self, agent_id: &str) -> Result<AgentStatus> {
        let key = agent_key(agent_id)?;
        let reservation = self.agents.get(agent_id).map(|r| r.value().clone());
        Ok(AgentStatus {
            agent_id: agent_id.to_string(),
            reserved: reservation.is_some(),
            locked: self.locks.is_locked(&key),
            request_id: reservation.map(|r| r.request_id),
        })
    }

    /// Recorded reservation of an agent
    pub fn agent_reservation(&self, agent_id: &str) -> Option<AgentReservation> {
        self.agents.get(agent_id).map(|r| r.value().clone())
    }

    /// Snapshot of a slot
    pub fn slot(&self, slot: &str) -> Result<Option<Slot>> {
        let slot_id: SlotId = slot.parse()?;
        Ok(self.slots.get(slot_id))
    }

    /// Snapshot of every known slot, ordered by id
    pub fn slots(&self) -> Vec<Slot> {
        self.slots.list()
    }

    /// Version record of a slot
    pub fn slot_version(&self, slot: &str) -> Result<Option<VersionedResource>> {
        let slot_id: SlotId = slot.parse()?;
        Ok(self.versions.current(&slot_id.resource_key()))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop all locks, versions, idempotency records and bookings, then
    /// restore the seeded catalog
    ///
    /// Waits for claims in progress to finish; claims arriving meanwhile
    /// wait for the reset. Each claim lands wholly before or wholly after
    /// it. Pessimistic holds are not dropped: they only exist while an
    /// effect runs, and the table stays exclusive across the reset.
    pub fn reset(&self) {
        let _exclusive = self.reset_gate.write();
        self.locks.clear();
        self.idempotency.clear();
        self.agents.clear();
        self.versions.clear();
        self.slots.reset();
        self.seed_versions();
        info!(seeded_slots = self.config.seeded_slots, "reservation state reset");
    }

    /// Remove expired locks and idempotency records now
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            locks: self.locks.sweep_expired(),
            idempotency: self.idempotency.sweep_expired(),
        };
        if report.total() > 0 {
            debug!(locks = report.locks, idempotency = report.idempotency, "manual sweep");
        }
        report
    }

    /// Counters across all subsystems
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            locks: self.locks.stats(),
            idempotency: self.idempotency.stats(),
            versioned_resources: self.versions.len(),
            active_holds: self.holds.len(),
            agent_reservations: self.agents.len(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Active configuration
    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Clock driving expiry
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Agent lock manager
    pub fn lock_manager(&self) -> &DistributedLockManager {
        &self.locks
    }

    /// Slot version store
    pub fn version_store(&self) -> &OptimisticVersionStore {
        &self.versions
    }

    /// Slot hold table
    pub fn lock_table(&self) -> &PessimisticLockTable {
        &self.holds
    }

    /// Idempotency cache
    pub fn idempotency_cache(&self) -> &IdempotencyCache {
        &self.idempotency
    }

    /// Whether the background sweeper is running
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_some()
    }
}

fn agent_key(agent_id: &str) -> Result<ResourceKey> {
    ResourceKey::namespaced(AGENT_NAMESPACE, agent_id)
}

fn reject_request_id(request: &ClaimRequest) -> Result<()> {
    if request.request_id.is_some() {
        return Err(Error::invalid_parameter(
            "request_id",
            "only distributed lock claims carry a request id",
        ));
    }
    Ok(())
}
