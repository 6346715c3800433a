//! Optimistic version store
//!
//! Each resource carries a version counter. A commit names the version the
//! caller last observed; it succeeds only if that is still the stored
//! version, and then bumps the version by exactly one.
//!
//! ```text
//! commit(key, expected):
//!   lock shard entry for key
//!   IF stored.version != expected -> Conflict(VersionMismatch), no mutation
//!   ELSE stored.version += 1; stored.committed = true -> Granted(new_version)
//! ```
//!
//! Losers are not queued; they re-read the version and retry on their own.

use crate::ShardedMap;
use chrono::{DateTime, Utc};
use holdfast_core::{Claim, Clock, ConflictReason, Error, ResourceKey, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// What to do with a key the store has never seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Create the resource at version 0 on first access
    #[default]
    AutoInit,
    /// Reject with [`Error::NotFound`]; resources must be seeded first
    Reject,
}

/// Versioned state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedResource {
    /// Resource identity
    pub resource_key: ResourceKey,
    /// Version counter, starts at 0, only ever increases
    pub version: u64,
    /// Whether any commit has succeeded
    pub committed: bool,
    /// When the latest commit succeeded
    pub committed_at: Option<DateTime<Utc>>,
}

impl VersionedResource {
    /// Fresh, uncommitted resource at version 0
    pub fn new(resource_key: ResourceKey) -> Self {
        Self {
            resource_key,
            version: 0,
            committed: false,
            committed_at: None,
        }
    }
}

/// Compare-and-increment store keyed by resource
#[derive(Debug)]
pub struct OptimisticVersionStore {
    resources: ShardedMap<ResourceKey, VersionedResource>,
    policy: MissingKeyPolicy,
    clock: Arc<dyn Clock>,
}

impl OptimisticVersionStore {
    /// Create an empty store
    pub fn new(policy: MissingKeyPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            resources: ShardedMap::default(),
            policy,
            clock,
        }
    }

    /// Policy for unknown keys
    pub fn policy(&self) -> MissingKeyPolicy {
        self.policy
    }

    /// Commit against `expected`, returning the new version
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the key is unknown under
    /// [`MissingKeyPolicy::Reject`]. A stale `expected` is a conflict, not
    /// an error.
    pub fn commit(&self, key: &ResourceKey, expected: u64) -> Result<Claim<u64>> {
        self.compare_and_increment(key, expected, false)
    }

    /// Like [`commit`](Self::commit), but a resource that was already
    /// committed once is rejected with `Conflict(AlreadyBooked)`
    ///
    /// The version check runs first, so a stale caller still sees
    /// `VersionMismatch`.
    pub fn claim(&self, key: &ResourceKey, expected: u64) -> Result<Claim<u64>> {
        self.compare_and_increment(key, expected, true)
    }

    fn compare_and_increment(
        &self,
        key: &ResourceKey,
        expected: u64,
        first_commit_only: bool,
    ) -> Result<Claim<u64>> {
        let mut resource = match self.policy {
            MissingKeyPolicy::AutoInit => self
                .resources
                .entry(key.clone())
                .or_insert_with(|| VersionedResource::new(key.clone())),
            MissingKeyPolicy::Reject => self
                .resources
                .get_mut(key)
                .ok_or_else(|| Error::NotFound(key.to_string()))?,
        };

        if resource.version != expected {
            trace!(key = %key, expected, actual = resource.version, "version mismatch");
            return Ok(Claim::Conflict(ConflictReason::VersionMismatch {
                expected,
                actual: resource.version,
            }));
        }
        if first_commit_only && resource.committed {
            trace!(key = %key, "resource already committed");
            return Ok(Claim::Conflict(ConflictReason::AlreadyBooked));
        }

        resource.version += 1;
        resource.committed = true;
        resource.committed_at = Some(self.clock.wall());
        let version = resource.version;
        drop(resource);

        debug!(key = %key, version, "optimistic commit");
        Ok(Claim::Granted(version))
    }

    /// Register `key` at version 0 if it is not yet known
    pub fn seed(&self, key: ResourceKey) {
        self.resources
            .entry(key.clone())
            .or_insert_with(|| VersionedResource::new(key));
    }

    /// Snapshot of the stored resource
    pub fn current(&self, key: &ResourceKey) -> Option<VersionedResource> {
        self.resources.get(key).map(|r| r.value().clone())
    }

    /// Current version, if the key is known
    pub fn version(&self, key: &ResourceKey) -> Option<u64> {
        self.resources.get(key).map(|r| r.version)
    }

    /// Number of known resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Forget every resource
    pub fn clear(&self) {
        self.resources.clear();
    }
}
