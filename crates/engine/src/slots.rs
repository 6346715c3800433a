//! Slot book
//!
//! The booking ledger behind the slot strategies. The concurrency
//! subsystems decide WHO wins; the slot book records WHAT the winner got.

use chrono::{DateTime, Utc};
use holdfast_concurrency::{MissingKeyPolicy, ShardedMap};
use holdfast_core::{Claim, ConflictReason, Error, Result, SlotId};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::debug;

/// A bookable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identity
    pub slot_id: SlotId,
    /// Agent serving this slot
    pub agent_id: String,
    /// Whether any claim has booked it
    pub booked: bool,
    /// Time of the most recent booking
    pub booked_at: Option<DateTime<Utc>>,
    /// Number of successful claims
    pub claims: u64,
}

impl Slot {
    fn vacant(slot_id: SlotId) -> Self {
        Self {
            slot_id,
            agent_id: slot_id.default_agent(),
            booked: false,
            booked_at: None,
            claims: 0,
        }
    }
}

/// Catalog of slots and their bookings
///
/// Under [`MissingKeyPolicy::AutoInit`] the first booking of an unseeded
/// slot adds it to the catalog, where it stays until [`reset`](Self::reset).
/// Under [`MissingKeyPolicy::Reject`] the catalog is exactly the seeded
/// range and never grows.
#[derive(Debug)]
pub struct SlotBook {
    slots: ShardedMap<SlotId, Slot>,
    seeded: u32,
    policy: MissingKeyPolicy,
}

impl SlotBook {
    /// Create a slot book seeded with `1..=seeded`
    pub fn new(seeded: u32, policy: MissingKeyPolicy) -> Self {
        let book = Self {
            slots: ShardedMap::default(),
            seeded,
            policy,
        };
        book.seed();
        book
    }

    fn seed(&self) {
        for id in 1..=self.seeded {
            if let Ok(slot_id) = SlotId::new(id) {
                self.slots.insert(slot_id, Slot::vacant(slot_id));
            }
        }
    }

    /// Seeded slot ids
    pub fn seeded_ids(&self) -> impl Iterator<Item = SlotId> {
        (1..=self.seeded).filter_map(|id| SlotId::new(id).ok())
    }

    /// Check that `slot_id` may be claimed
    ///
    /// Decided from the seeded range alone, so the answer does not change
    /// while the catalog is being reset.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown slot under
    /// [`MissingKeyPolicy::Reject`].
    pub fn resolve(&self, slot_id: SlotId) -> Result<()> {
        match self.policy {
            MissingKeyPolicy::AutoInit => Ok(()),
            MissingKeyPolicy::Reject if slot_id.get() <= self.seeded => Ok(()),
            MissingKeyPolicy::Reject => Err(Error::NotFound(format!("slot {}", slot_id))),
        }
    }

    /// Record a booking at `at`
    ///
    /// With `exclusive`, a slot that is already booked is left untouched
    /// and `Conflict(AlreadyBooked)` is returned.
    pub fn book(&self, slot_id: SlotId, at: DateTime<Utc>, exclusive: bool) -> Claim<DateTime<Utc>> {
        match self.book_with(slot_id, at, exclusive, || Ok::<_, Infallible>(Claim::Granted(at))) {
            Ok(claim) => claim,
            Err(never) => match never {},
        }
    }

    /// Record a booking only if `gate` grants it
    ///
    /// The booked check, `gate` and the booking itself all run while the
    /// slot's entry is locked, so a strategy's own commit (for example an
    /// optimistic version bump) and the booking it pays for are one atomic
    /// step. `gate` must not touch this slot book.
    pub fn book_with<T, E>(
        &self,
        slot_id: SlotId,
        at: DateTime<Utc>,
        exclusive: bool,
        gate: impl FnOnce() -> std::result::Result<Claim<T>, E>,
    ) -> std::result::Result<Claim<T>, E> {
        let mut slot = self
            .slots
            .entry(slot_id)
            .or_insert_with(|| Slot::vacant(slot_id));
        if exclusive && slot.booked {
            return Ok(Claim::Conflict(ConflictReason::AlreadyBooked));
        }
        let value = match gate()? {
            Claim::Granted(value) => value,
            Claim::Conflict(reason) => return Ok(Claim::Conflict(reason)),
        };
        slot.booked = true;
        slot.booked_at = Some(at);
        slot.claims += 1;
        debug!(slot = %slot_id, claims = slot.claims, "slot booked");
        Ok(Claim::Granted(value))
    }

    /// Snapshot of one slot
    pub fn get(&self, slot_id: SlotId) -> Option<Slot> {
        self.slots.get(&slot_id).map(|s| s.value().clone())
    }

    /// Snapshot of every slot, ordered by id
    pub fn list(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.slots.iter().map(|s| s.value().clone()).collect();
        slots.sort_by_key(|s| s.slot_id);
        slots
    }

    /// Drop every booking and restore the seeded catalog
    pub fn reset(&self) {
        self.slots.clear();
        self.seed();
    }
}
