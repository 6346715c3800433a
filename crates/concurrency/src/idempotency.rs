//! Idempotency cache
//!
//! Remembers the outcome of the first execution for each idempotency key.
//!
//! ## Join semantics
//!
//! Each key maps to a shared cell. The first caller to reach an empty cell
//! runs the operation; callers arriving while it runs block on the same
//! cell and receive its result. Nobody races to run a second copy.
//!
//! ```text
//! execute_once(key, op):
//!   cell = map.entry(key).or_insert(new cell)   // per-key atomic
//!   release the map shard
//!   cell.get_or_init(op)                        // exactly one op runs
//! ```
//!
//! The shard lock is released before the operation runs, so a slow
//! operation only stalls callers that share its key.
//!
//! ## Retention
//!
//! Completed records expire `ttl` after their execution completes and are
//! removed by [`Sweep::sweep_expired`]. When a new key arrives at
//! `capacity`, one caller evicts the oldest completed records down to a
//! low-water mark, so the cost of a full pass is paid once per batch of
//! admissions rather than on every insert. In-flight executions are never
//! evicted. Capacity is a soft bound: concurrent inserts of new keys may
//! briefly exceed it while an eviction pass runs.

use crate::{ShardedMap, Sweep};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use holdfast_core::{Clock, IdempotencyKey, Outcome};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Retention bounds for idempotency records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRetention {
    /// How long a completed record is replayed
    pub ttl: Duration,
    /// Maximum number of records kept
    pub capacity: usize,
}

impl Default for IdempotencyRetention {
    /// 24 hours, 100 000 records
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            capacity: 100_000,
        }
    }
}

/// A completed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Key the outcome is stored under
    pub idempotency_key: IdempotencyKey,
    /// Outcome of the single execution
    pub outcome: Outcome,
    /// When the execution completed
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Completed {
    record: IdempotencyRecord,
    at: Instant,
}

#[derive(Debug, Default)]
struct Cell {
    completed: OnceCell<Completed>,
}

impl Cell {
    fn completed_at(&self) -> Option<Instant> {
        self.completed.get().map(|done| done.at)
    }

    fn record(&self) -> Option<&IdempotencyRecord> {
        self.completed.get().map(|done| &done.record)
    }

    fn is_expired_at(&self, now: Instant, ttl: Duration) -> bool {
        self.completed_at()
            .is_some_and(|at| now.saturating_duration_since(at) >= ttl)
    }
}

/// Records freed per eviction pass: a tenth of capacity, at least one
fn eviction_batch(capacity: usize) -> usize {
    (capacity / 10).max(1)
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdempotencyStats {
    /// Operations actually executed
    pub executions: u64,
    /// Calls answered from a recorded or in-flight execution
    pub replays: u64,
    /// Records removed by TTL or capacity
    pub evictions: u64,
    /// Records currently stored (including in-flight)
    pub entries: usize,
}

/// First-writer-wins outcome cache
#[derive(Debug)]
pub struct IdempotencyCache {
    cells: ShardedMap<IdempotencyKey, Arc<Cell>>,
    retention: IdempotencyRetention,
    clock: Arc<dyn Clock>,
    evicting: Mutex<()>,
    executions: AtomicU64,
    replays: AtomicU64,
    evictions: AtomicU64,
}

impl IdempotencyCache {
    /// Create an empty cache
    ///
    /// A zero capacity is raised to 1.
    pub fn new(retention: IdempotencyRetention, clock: Arc<dyn Clock>) -> Self {
        Self {
            cells: ShardedMap::default(),
            retention: IdempotencyRetention {
                capacity: retention.capacity.max(1),
                ..retention
            },
            clock,
            evicting: Mutex::new(()),
            executions: AtomicU64::new(0),
            replays: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Retention bounds in effect
    pub fn retention(&self) -> IdempotencyRetention {
        self.retention
    }

    /// Run `operation` once per key and replay its outcome afterwards
    pub fn execute_once(&self, key: &IdempotencyKey, operation: impl FnOnce() -> Outcome) -> Outcome {
        match self.try_execute_once(key, || Ok::<_, Infallible>(operation())) {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`execute_once`](Self::execute_once)
    ///
    /// An `Err` from `operation` is handed back to this caller and is not
    /// recorded; the next caller for the key executes again. Callers that
    /// were waiting on the failed execution retry it themselves, one at a
    /// time.
    pub fn try_execute_once<E>(
        &self,
        key: &IdempotencyKey,
        operation: impl FnOnce() -> Result<Outcome, E>,
    ) -> Result<Outcome, E> {
        let cell = self.cell_for(key);
        let mut executed = false;

        let done = cell.completed.get_or_try_init(|| {
            executed = true;
            let outcome = operation()?;
            Ok(Completed {
                record: IdempotencyRecord {
                    idempotency_key: key.clone(),
                    outcome,
                    created_at: self.clock.wall(),
                },
                at: self.clock.now(),
            })
        })?;
        let record = &done.record;

        if executed {
            self.executions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, committed = record.outcome.is_committed(), "idempotent operation executed");
        } else {
            self.replays.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "idempotent outcome replayed");
        }
        Ok(record.outcome.clone())
    }

    /// Find the live cell for `key` or insert a fresh one
    fn cell_for(&self, key: &IdempotencyKey) -> Arc<Cell> {
        let now = self.clock.now();
        let ttl = self.retention.ttl;

        if let Some(cell) = self.cells.get(key) {
            if !cell.is_expired_at(now, ttl) {
                return Arc::clone(cell.value());
            }
        }

        // Evict before taking the entry lock: eviction walks every shard.
        if self.cells.len() >= self.retention.capacity && !self.cells.contains_key(key) {
            self.evict_for_capacity(now);
        }

        match self.cells.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired_at(now, ttl) {
                    occupied.insert(Arc::new(Cell::default()));
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => Arc::clone(vacant.insert(Arc::new(Cell::default())).value()),
        }
    }

    /// Free a batch of room: expired records first, then the oldest
    /// completed ones, down to `capacity - eviction_batch(capacity)`
    ///
    /// Only one caller evicts at a time; the rest admit their key and move on.
    fn evict_for_capacity(&self, now: Instant) {
        let Some(_evicting) = self.evicting.try_lock() else {
            return;
        };
        let capacity = self.retention.capacity;
        if self.cells.len() < capacity {
            return;
        }
        let low_water = capacity - eviction_batch(capacity);

        let swept = self.sweep_at(now);
        let len = self.cells.len();
        if len <= low_water {
            debug!(swept, "expired idempotency records evicted for capacity");
            return;
        }

        let mut completed: Vec<(Instant, IdempotencyKey)> = self
            .cells
            .iter()
            .filter_map(|entry| entry.value().completed_at().map(|at| (at, entry.key().clone())))
            .collect();
        let excess = (len - low_water).min(completed.len());
        if excess == 0 {
            return;
        }
        if excess < completed.len() {
            completed.select_nth_unstable_by_key(excess - 1, |(at, _)| *at);
        }

        let mut evicted = 0u64;
        for (_, key) in completed.into_iter().take(excess) {
            if self
                .cells
                .remove_if(&key, |_, cell| cell.completed_at().is_some())
                .is_some()
            {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        debug!(swept, evicted, capacity, "oldest idempotency records evicted");
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.retention.ttl;
        let mut removed = 0usize;
        self.cells.retain(|_, cell| {
            let keep = !cell.is_expired_at(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Recorded outcome for `key`, if completed and not expired
    pub fn lookup(&self, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        let now = self.clock.now();
        self.cells
            .get(key)
            .filter(|cell| !cell.is_expired_at(now, self.retention.ttl))
            .and_then(|cell| cell.record().cloned())
    }

    /// Number of stored records, including in-flight ones
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Forget every record
    ///
    /// Executions already in flight finish and return to their callers,
    /// but their outcomes are not retained.
    pub fn clear(&self) {
        self.cells.clear();
    }

    /// Statistics since creation
    pub fn stats(&self) -> IdempotencyStats {
        IdempotencyStats {
            executions: self.executions.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.cells.len(),
        }
    }
}

impl Sweep for IdempotencyCache {
    fn name(&self) -> &'static str {
        "idempotency"
    }

    fn sweep_expired(&self) -> usize {
        self.sweep_at(self.clock.now())
    }
}
