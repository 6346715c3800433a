//! Public types for the Holdfast API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// Claim results
pub use holdfast_core::{Claim, ConflictReason, Outcome};

// Identities
pub use holdfast_core::{IdempotencyKey, LockToken, ResourceKey, SlotId};

// Time sources
pub use holdfast_core::{Clock, ManualClock, SystemClock};

// Subsystem records
pub use holdfast_concurrency::{
    IdempotencyRecord, IdempotencyStats, LockEntry, LockManagerStats, MissingKeyPolicy,
    VersionedResource,
};

// Service types
pub use holdfast_engine::{
    AgentReservation, AgentStatus, ClaimRequest, ReservationConfig, ServiceStats, Slot,
    Strategy, SweepReport,
};
