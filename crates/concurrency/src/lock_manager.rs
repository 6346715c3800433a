//! Distributed lock manager with TTL expiry
//!
//! Emulates a lock service's scripted "SET if not exists, with expiry" and
//! "delete only if the value is mine" operations in-process.
//!
//! ## Acquire
//!
//! ```text
//! 1. Lock the shard entry for the key (per-key critical section)
//! 2. IF no entry: insert {token, now + ttl}, return Granted(token)
//! 3. IF entry expired (now >= expires_at): replace it, return Granted(token)
//! 4. ELSE: return Conflict(LockHeld) without blocking
//! ```
//!
//! ## Release
//!
//! Removes the entry only if the presented token is the holder token and
//! the lock is still live. An expired lock counts as absent, so its former
//! holder gets `Conflict(NotHolder)` whether or not the key was re-acquired.
//!
//! ## Expiry
//!
//! Expired entries are evicted lazily on the next `acquire` for the key and
//! eagerly by [`Sweep::sweep_expired`], which the engine runs periodically.

use crate::{ShardedMap, Sweep};
use dashmap::mapref::entry::Entry;
use holdfast_core::{Claim, Clock, ConflictReason, Error, LockToken, ResourceKey, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A live or expired lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// Locked resource
    pub resource_key: ResourceKey,
    /// Token of the current holder
    pub holder: LockToken,
    /// When the lock was granted
    pub acquired_at: Instant,
    /// When the lock stops excluding other acquirers
    pub expires_at: Instant,
}

impl LockEntry {
    /// Check if the lock has expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Remaining TTL at `now`, zero if expired
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

#[derive(Debug, Default)]
struct LockCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    conflicts: AtomicU64,
    expired: AtomicU64,
}

/// Point-in-time lock manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockManagerStats {
    /// Successful acquisitions
    pub acquired: u64,
    /// Successful releases
    pub released: u64,
    /// Acquisitions or releases that lost
    pub conflicts: u64,
    /// Expired entries evicted (lazily or by sweep)
    pub expired: u64,
    /// Entries currently stored, including expired ones not yet swept
    pub entries: usize,
}

/// Exclusive, auto-expiring locks keyed by resource
///
/// # Thread Safety
///
/// Acquire and release each run inside a single `DashMap` entry access,
/// so the check-and-set is atomic per key. Keys in different shards never
/// contend.
#[derive(Debug)]
pub struct DistributedLockManager {
    entries: ShardedMap<ResourceKey, LockEntry>,
    clock: Arc<dyn Clock>,
    counters: LockCounters,
}

impl DistributedLockManager {
    /// Create an empty lock manager
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: ShardedMap::default(),
            clock,
            counters: LockCounters::default(),
        }
    }

    /// Try to acquire `key` with a freshly generated token
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `ttl` is zero or overflows the
    /// monotonic clock. Losing to a live holder is `Ok(Claim::Conflict)`.
    pub fn acquire(&self, key: &ResourceKey, ttl: Duration) -> Result<Claim<LockToken>> {
        self.acquire_as(key, LockToken::generate(), ttl)
    }

    /// Try to acquire `key` using a caller-supplied token
    ///
    /// The caller is responsible for the token's uniqueness; two acquirers
    /// sharing a token can release each other's locks.
    pub fn acquire_as(
        &self,
        key: &ResourceKey,
        token: LockToken,
        ttl: Duration,
    ) -> Result<Claim<LockToken>> {
        if ttl.is_zero() {
            return Err(Error::invalid_parameter("ttl", "must be greater than zero"));
        }
        let now = self.clock.now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| Error::invalid_parameter("ttl", "too large"))?;
        let entry = LockEntry {
            resource_key: key.clone(),
            holder: token.clone(),
            acquired_at: now,
            expires_at,
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired_at(now) {
                    self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                    trace!(key = %key, "lock held, acquire rejected");
                    return Ok(Claim::Conflict(ConflictReason::LockHeld));
                }
                let stale = occupied.insert(entry);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, stale_holder = %stale.holder, "evicted expired lock");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "lock acquired");
        Ok(Claim::Granted(token))
    }

    /// Release `key` if `token` is the current, unexpired holder
    ///
    /// Releasing an absent or expired key is `Conflict(NotHolder)`. An
    /// expired entry is left for the next acquire or sweep to evict.
    pub fn release(&self, key: &ResourceKey, token: &LockToken) -> Claim<()> {
        let now = self.clock.now();
        match self
            .entries
            .remove_if(key, |_, entry| entry.holder == *token && !entry.is_expired_at(now))
        {
            Some(_) => {
                self.counters.released.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "lock released");
                Claim::Granted(())
            }
            None => {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "release by non-holder ignored");
                Claim::Conflict(ConflictReason::NotHolder)
            }
        }
    }

    /// Current live holder of `key`
    pub fn holder(&self, key: &ResourceKey) -> Option<LockToken> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.holder.clone())
    }

    /// Snapshot of the live entry for `key`
    pub fn entry(&self, key: &ResourceKey) -> Option<LockEntry> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
    }

    /// Check if `key` is held by an unexpired lock
    pub fn is_locked(&self, key: &ResourceKey) -> bool {
        self.holder(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every lock
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Statistics since creation
    pub fn stats(&self) -> LockManagerStats {
        LockManagerStats {
            acquired: self.counters.acquired.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Sweep for DistributedLockManager {
    fn name(&self) -> &'static str {
        "locks"
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.counters
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}
