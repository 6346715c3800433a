//! Concurrency strategies for Holdfast
//!
//! This crate implements the three competing claim strategies plus the
//! idempotency layer:
//! - DistributedLockManager: exclusive locks with TTL expiry and holder tokens
//! - OptimisticVersionStore: compare-and-increment on a per-resource version
//! - PessimisticLockTable: fail-fast exclusive holds scoped to one operation
//! - IdempotencyCache: first-writer-wins outcome memoization with join semantics
//!
//! Every map is sharded (`DashMap`), so operations on distinct keys never
//! serialize on a shared lock. Each per-key critical section is one
//! map-entry access, which gives per-key linearizability.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod idempotency;
pub mod lock_manager;
pub mod pessimistic;
pub mod version_store;

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

pub use idempotency::{IdempotencyCache, IdempotencyRecord, IdempotencyRetention, IdempotencyStats};
pub use lock_manager::{DistributedLockManager, LockEntry, LockManagerStats};
pub use pessimistic::PessimisticLockTable;
pub use version_store::{MissingKeyPolicy, OptimisticVersionStore, VersionedResource};

/// Sharded map with FxHash, used by every subsystem
pub type ShardedMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// A subsystem holding entries that can expire
///
/// The engine's background sweeper calls [`Sweep::sweep_expired`] on a
/// fixed cadence so expired entries are reclaimed even when nobody touches
/// their keys again.
pub trait Sweep: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Remove every expired entry, returning how many were removed
    fn sweep_expired(&self) -> usize;
}
