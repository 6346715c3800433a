//! Convenient imports for Holdfast.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```
//! use holdfast::prelude::*;
//!
//! let hf = Holdfast::builder().no_sweeper().open()?;
//! assert!(hf.reserve_slot_pessimistic("3")?.is_committed());
//! # Ok::<(), holdfast::Error>(())
//! ```

// Main entry point
pub use crate::holdfast::{Holdfast, HoldfastBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Claims
pub use crate::types::{ClaimRequest, ConflictReason, Outcome, Strategy};

// Inspection
pub use crate::types::{AgentStatus, Slot, SweepReport};

// Configuration and time
pub use crate::types::{ManualClock, ReservationConfig};
