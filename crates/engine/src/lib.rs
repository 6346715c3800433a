//! Reservation engine for Holdfast
//!
//! Wires the concurrency strategies into a single service:
//! - ReservationService: validates claims and dispatches them to a strategy
//! - SlotBook: the booking ledger for slots
//! - Sweeper: background thread that evicts expired locks and records
//! - ReservationConfig: TOML-loadable settings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod request;
pub mod service;
pub mod slots;
pub mod sweeper;

pub use config::{
    ReservationConfig, DEFAULT_LOCK_TTL, DEFAULT_SEEDED_SLOTS, DEFAULT_SWEEP_INTERVAL, MAX_LOCK_TTL,
};
pub use request::{ClaimRequest, Strategy};
pub use service::{AgentReservation, AgentStatus, ReservationService, ServiceStats, SweepReport};
pub use slots::{Slot, SlotBook};
pub use sweeper::Sweeper;
