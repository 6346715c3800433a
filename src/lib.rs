//! # Holdfast
//!
//! Concurrency control for reservations.
//!
//! Holdfast arbitrates competing claims on shared resources with three
//! strategies, plus an idempotency layer on top:
//!
//! - **Distributed lock** - an agent is claimed by acquiring a TTL lock;
//!   a crashed holder's lock lapses on its own
//! - **Optimistic** - a slot is claimed by committing against the version
//!   the caller read; a stale read loses
//! - **Pessimistic** - a slot is claimed under an exclusive hold; anyone
//!   arriving while it is held is turned away immediately
//! - **Idempotent** - a claim submitted twice under the same key runs once
//!   and the retry replays the first outcome
//!
//! ## Quick Start
//!
//! ```
//! use holdfast::prelude::*;
//!
//! let hf = Holdfast::builder().no_sweeper().open()?;
//!
//! let won = hf.reserve_agent("agent_1", Some("req-1"))?;
//! let lost = hf.reserve_agent("agent_1", Some("req-2"))?;
//! assert!(won.is_committed());
//! assert_eq!(lost.conflict_reason(), Some(ConflictReason::LockHeld));
//!
//! // Start over
//! hf.reset();
//! # Ok::<(), holdfast::Error>(())
//! ```
//!
//! ## Errors and conflicts
//!
//! Losing a race is an ordinary result: every claim returns
//! [`Outcome::Committed`] or [`Outcome::Conflict`]. [`Error`] is reserved for
//! malformed requests, unknown slots (when configured to reject them) and
//! startup failures.

#![warn(missing_docs)]

mod error;
mod holdfast;
mod types;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use holdfast::{Holdfast, HoldfastBuilder};

// Re-export types
pub use types::*;
