//! Main entry point for Holdfast.
//!
//! This module provides the `Holdfast` handle, the primary entry point for
//! all reservation operations.

use crate::error::Result;
use holdfast_core::{Clock, Outcome};
use holdfast_concurrency::{MissingKeyPolicy, VersionedResource};
use holdfast_engine::{
    AgentStatus, ClaimRequest, ReservationConfig, ReservationService, ServiceStats, Slot,
    SweepReport,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The reservation service handle.
///
/// Cloning is cheap; clones share the same state, so a handle can be moved
/// into each worker thread.
///
/// # Example
///
/// ```
/// use holdfast::prelude::*;
///
/// let hf = Holdfast::builder().no_sweeper().open()?;
///
/// // Optimistic: the second caller read a stale version
/// assert!(hf.reserve_slot_optimistic("1", 0)?.is_committed());
/// assert!(hf.reserve_slot_optimistic("1", 0)?.is_conflict());
///
/// // Idempotent: the retry replays the first outcome
/// let first = hf.reserve_idempotent("order-17", "2")?;
/// assert_eq!(hf.reserve_idempotent("order-17", "2")?, first);
/// # Ok::<(), holdfast::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Holdfast {
    inner: Arc<ReservationService>,
}

impl Holdfast {
    /// Start with default settings.
    pub fn open() -> Result<Self> {
        Self::builder().open()
    }

    /// Start from a TOML configuration file.
    ///
    /// See [`ReservationConfig`] for the recognised keys.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = ReservationConfig::load(path)?;
        debug!(path = %path.display(), "configuration loaded");
        Self::builder().config(config).open()
    }

    /// Create a builder for service configuration.
    pub fn builder() -> HoldfastBuilder {
        HoldfastBuilder::new()
    }

    /// Reserve an agent under a TTL lock.
    ///
    /// `request_id` becomes the lock token; one is generated when absent.
    pub fn reserve_agent(&self, agent_id: &str, request_id: Option<&str>) -> Result<Outcome> {
        Ok(self.inner.reserve_agent(agent_id, request_id)?)
    }

    /// Release an agent lock held under `request_id`.
    pub fn release_agent(&self, agent_id: &str, request_id: &str) -> Result<Outcome> {
        Ok(self.inner.release_agent(agent_id, request_id)?)
    }

    /// Book a slot if its version still equals `expected_version`.
    pub fn reserve_slot_optimistic(&self, slot: &str, expected_version: u64) -> Result<Outcome> {
        Ok(self.inner.reserve_slot_optimistic(slot, expected_version)?)
    }

    /// Book a slot under an exclusive, fail-fast hold.
    pub fn reserve_slot_pessimistic(&self, slot: &str) -> Result<Outcome> {
        Ok(self.inner.reserve_slot_pessimistic(slot)?)
    }

    /// Book a slot at most once per idempotency key.
    pub fn reserve_idempotent(&self, idempotency_key: &str, slot: &str) -> Result<Outcome> {
        Ok(self.inner.reserve_idempotent(idempotency_key, slot)?)
    }

    /// Dispatch a claim request to its strategy.
    pub fn claim(&self, request: &ClaimRequest) -> Result<Outcome> {
        Ok(self.inner.claim(request)?)
    }

    /// Reservation and lock state of an agent.
    pub fn agent_status(&self, agent_id: &str) -> Result<AgentStatus> {
        Ok(self.inner.agent_status(agent_id)?)
    }

    /// Snapshot of a slot.
    pub fn slot(&self, slot: &str) -> Result<Option<Slot>> {
        Ok(self.inner.slot(slot)?)
    }

    /// Snapshot of every known slot, ordered by id.
    pub fn slots(&self) -> Vec<Slot> {
        self.inner.slots()
    }

    /// Version record of a slot.
    pub fn slot_version(&self, slot: &str) -> Result<Option<VersionedResource>> {
        Ok(self.inner.slot_version(slot)?)
    }

    /// Drop all state and restore the seeded catalog.
    ///
    /// Waits for claims in progress; each claim lands wholly before or
    /// wholly after the reset.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Remove expired locks and idempotency records now.
    pub fn sweep(&self) -> SweepReport {
        self.inner.sweep()
    }

    /// Counters across all subsystems.
    pub fn stats(&self) -> ServiceStats {
        self.inner.stats()
    }

    /// Active configuration.
    pub fn config(&self) -> &ReservationConfig {
        self.inner.config()
    }

    /// The underlying service, for direct subsystem access.
    pub fn service(&self) -> &ReservationService {
        &self.inner
    }
}

/// Builder for service configuration.
///
/// # Example
///
/// ```
/// use holdfast::prelude::*;
/// use std::time::Duration;
///
/// let hf = Holdfast::builder()
///     .lock_ttl(Duration::from_secs(30))
///     .seeded_slots(4)
///     .reject_unknown_slots()
///     .exclusive_booking(true)
///     .no_sweeper()
///     .open()?;
///
/// assert!(hf.reserve_slot_pessimistic("5").unwrap_err().is_not_found());
/// # Ok::<(), holdfast::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct HoldfastBuilder {
    config: ReservationConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl HoldfastBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting with `config`.
    pub fn config(mut self, config: ReservationConfig) -> Self {
        self.config = config;
        self
    }

    /// TTL applied to agent locks.
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.config.lock_ttl = ttl;
        self
    }

    /// Release agent locks as soon as the reservation is recorded.
    pub fn release_after_reserve(mut self, release: bool) -> Self {
        self.config.release_after_reserve = release;
        self
    }

    /// Seed slots `1..=count`.
    pub fn seeded_slots(mut self, count: u32) -> Self {
        self.config.seeded_slots = count;
        self
    }

    /// Answer claims on unseeded slots with not-found.
    pub fn reject_unknown_slots(mut self) -> Self {
        self.config.missing_slot_policy = MissingKeyPolicy::Reject;
        self
    }

    /// Reject claims on slots that are already booked.
    pub fn exclusive_booking(mut self, exclusive: bool) -> Self {
        self.config.exclusive_booking = exclusive;
        self
    }

    /// How long idempotency records are replayed.
    pub fn idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.config.idempotency_ttl = ttl;
        self
    }

    /// Maximum idempotency records kept.
    pub fn idempotency_capacity(mut self, capacity: usize) -> Self {
        self.config.idempotency_capacity = capacity;
        self
    }

    /// Background sweep cadence.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Run without the background sweeper.
    ///
    /// Expired entries are still evicted lazily and by [`Holdfast::sweep`].
    pub fn no_sweeper(self) -> Self {
        self.sweep_interval(Duration::ZERO)
    }

    /// Drive expiry from `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the settings and start the service.
    pub fn open(self) -> Result<Holdfast> {
        let service = match self.clock {
            Some(clock) => ReservationService::with_clock(self.config, clock)?,
            None => ReservationService::new(self.config)?,
        };
        Ok(Holdfast {
            inner: Arc::new(service),
        })
    }
}
