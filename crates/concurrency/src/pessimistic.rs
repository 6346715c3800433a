//! Pessimistic lock table
//!
//! Simulates `SELECT ... FOR UPDATE NOWAIT`: a caller takes an exclusive hold
//! on a resource for the duration of one effect. If the resource is already
//! held, the caller fails immediately with `Conflict(AlreadyHeld)`.
//!
//! The hold is a guard value. It is released when the guard drops, which
//! covers normal return, early return and unwinding from a panicking effect.
//! There is no TTL: a hold lives exactly as long as the effect runs, so the
//! effect must be short. For the same reason the table has no bulk clear:
//! every entry belongs to a running effect, and dropping it would let a
//! second effect start on the same key.

use crate::ShardedMap;
use dashmap::mapref::entry::Entry;
use holdfast_core::{Claim, ConflictReason, LockToken, ResourceKey};
use tracing::{trace, warn};

/// Exclusive per-resource holds with fail-fast acquisition
#[derive(Debug, Default)]
pub struct PessimisticLockTable {
    holds: ShardedMap<ResourceKey, LockToken>,
}

/// Scoped hold; removes its own entry on drop
struct HoldGuard<'a> {
    table: &'a PessimisticLockTable,
    key: ResourceKey,
    token: LockToken,
}

impl Drop for HoldGuard<'_> {
    fn drop(&mut self) {
        self.table
            .holds
            .remove_if(&self.key, |_, token| *token == self.token);
        if std::thread::panicking() {
            warn!(key = %self.key, "effect panicked, hold released");
        }
    }
}

impl PessimisticLockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `effect` while holding `key` exclusively
    ///
    /// The effect runs at most once, and only if the hold was acquired. The
    /// hold is released before this returns on every path. A fallible effect
    /// should return its `Result` as `T`; its failure still releases the hold.
    pub fn with_hold<T>(&self, key: &ResourceKey, effect: impl FnOnce() -> T) -> Claim<T> {
        let guard = match self.try_hold(key) {
            Some(guard) => guard,
            None => {
                trace!(key = %key, "hold rejected, already held");
                return Claim::Conflict(ConflictReason::AlreadyHeld);
            }
        };
        let value = effect();
        drop(guard);
        Claim::Granted(value)
    }

    fn try_hold(&self, key: &ResourceKey) -> Option<HoldGuard<'_>> {
        let token = match self.holds.entry(key.clone()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(vacant) => {
                let token = LockToken::generate();
                vacant.insert(token.clone());
                token
            }
        };
        Some(HoldGuard {
            table: self,
            key: key.clone(),
            token,
        })
    }

    /// Check if `key` is currently held
    pub fn is_held(&self, key: &ResourceKey) -> bool {
        self.holds.contains_key(key)
    }

    /// Number of holds in place
    pub fn len(&self) -> usize {
        self.holds.len()
    }

    /// Check if no holds are in place
    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }
}
