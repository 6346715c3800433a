//! Reservation Integration Tests
//!
//! End-to-end tests through the `Holdfast` facade, one module per strategy
//! plus service lifecycle.
//!
//! ```bash
//! cargo test --test reservations
//! cargo test --test reservations idempotency::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod idempotency;
mod lifecycle;
mod optimistic;
mod pessimistic;
