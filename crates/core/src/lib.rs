//! Core types for Holdfast
//!
//! This crate defines the vocabulary shared by every concurrency strategy:
//! - [`ResourceKey`], [`SlotId`], [`IdempotencyKey`]: validated identities
//! - [`LockToken`]: unguessable holder token bound to a lock
//! - [`Claim`] and [`Outcome`]: conflict-as-value results
//! - [`Clock`]: monotonic + wall time source used for expiry
//! - [`Error`]: programming errors rejected before any subsystem is entered

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod outcome;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use outcome::{Claim, ConflictReason, Outcome};
pub use types::{IdempotencyKey, LockToken, ResourceKey, SlotId, MAX_IDENTITY_LEN};
