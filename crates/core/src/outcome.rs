//! Claim results
//!
//! Every concurrency strategy returns its result as a value. Losing a race
//! is an expected, retryable outcome and never an `Err`.
//!
//! | Reason | Produced by | Caller action |
//! |--------|-------------|---------------|
//! | LockHeld | distributed lock `acquire` | retry later or fail fast |
//! | VersionMismatch | optimistic `commit` | re-read version, retry |
//! | AlreadyHeld | pessimistic `with_hold` | retry |
//! | NotHolder | distributed lock `release` | nothing; lock already gone |
//! | AlreadyBooked | slot claims with exclusive booking | pick another slot |

use crate::types::ResourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a claim lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    /// An unexpired distributed lock is held by someone else
    LockHeld,
    /// The expected version did not match the stored version
    VersionMismatch {
        /// Version the caller expected
        expected: u64,
        /// Version found in the store
        actual: u64,
    },
    /// A pessimistic hold is already in place
    AlreadyHeld,
    /// The presented token does not own the lock
    NotHolder,
    /// The slot has already been booked
    AlreadyBooked,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::LockHeld => f.write_str("resource is locked by another holder"),
            ConflictReason::VersionMismatch { expected, actual } => write!(
                f,
                "version mismatch: expected {}, found {}",
                expected, actual
            ),
            ConflictReason::AlreadyHeld => {
                f.write_str("resource is held by another transaction")
            }
            ConflictReason::NotHolder => f.write_str("token does not hold the lock"),
            ConflictReason::AlreadyBooked => f.write_str("slot already booked"),
        }
    }
}

/// Result of a single subsystem operation
///
/// `Granted` carries the strategy-specific payload: a lock token, a new
/// version number, or the value produced by a pessimistic effect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Claim<T> {
    /// The operation took effect
    Granted(T),
    /// The operation lost and changed nothing
    Conflict(ConflictReason),
}

impl<T> Claim<T> {
    /// Check if the claim was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, Claim::Granted(_))
    }

    /// The conflict reason, if any
    pub fn conflict(&self) -> Option<ConflictReason> {
        match self {
            Claim::Granted(_) => None,
            Claim::Conflict(reason) => Some(*reason),
        }
    }

    /// The granted payload, if any
    pub fn granted(self) -> Option<T> {
        match self {
            Claim::Granted(value) => Some(value),
            Claim::Conflict(_) => None,
        }
    }

    /// Transform the granted payload
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Claim<U> {
        match self {
            Claim::Granted(value) => Claim::Granted(f(value)),
            Claim::Conflict(reason) => Claim::Conflict(reason),
        }
    }

    /// Chain a second claim that only runs when this one was granted
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Claim<U>) -> Claim<U> {
        match self {
            Claim::Granted(value) => f(value),
            Claim::Conflict(reason) => Claim::Conflict(reason),
        }
    }
}

/// Uniform outcome reported to callers of the reservation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The claim was committed
    Committed {
        /// Resource that was claimed
        resource_key: ResourceKey,
        /// When the claim took effect
        assigned_at: DateTime<Utc>,
    },
    /// The claim lost a race
    Conflict {
        /// Why it lost
        reason: ConflictReason,
    },
}

impl Outcome {
    /// Build a committed outcome
    pub fn committed(resource_key: ResourceKey, assigned_at: DateTime<Utc>) -> Self {
        Outcome::Committed {
            resource_key,
            assigned_at,
        }
    }

    /// Build a conflict outcome
    pub fn conflict(reason: ConflictReason) -> Self {
        Outcome::Conflict { reason }
    }

    /// Check if the outcome is committed
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed { .. })
    }

    /// Check if the outcome is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Outcome::Conflict { .. })
    }

    /// The conflict reason, if any
    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Outcome::Committed { .. } => None,
            Outcome::Conflict { reason } => Some(*reason),
        }
    }

    /// HTTP status the request layer reports: 200 committed, 409 conflict
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Committed { .. } => 200,
            Outcome::Conflict { .. } => 409,
        }
    }
}
