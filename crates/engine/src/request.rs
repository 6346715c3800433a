//! Claim requests
//!
//! A [`ClaimRequest`] is what the request layer hands the reservation
//! service: which strategy, which resource, and the strategy's parameters.

use holdfast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Concurrency strategy used to arbitrate a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// TTL lock on an agent
    DistributedLock,
    /// Version-checked commit on a slot
    Optimistic,
    /// Fail-fast exclusive hold on a slot
    Pessimistic,
}

impl Strategy {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DistributedLock => "distributed_lock",
            Strategy::Optimistic => "optimistic",
            Strategy::Pessimistic => "pessimistic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "distributed_lock" | "lock" | "agent" => Ok(Strategy::DistributedLock),
            "optimistic" => Ok(Strategy::Optimistic),
            "pessimistic" => Ok(Strategy::Pessimistic),
            other => Err(Error::invalid_parameter(
                "strategy",
                format!("unknown strategy {:?}", other),
            )),
        }
    }
}

/// A request to claim one resource
///
/// `resource` is an agent id for [`Strategy::DistributedLock`] and a slot
/// number for the slot strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Strategy to dispatch to
    pub strategy: Strategy,
    /// Agent id or slot number
    pub resource: String,
    /// Version observed by the caller (optimistic only, defaults to 0)
    #[serde(default)]
    pub expected_version: Option<u64>,
    /// Caller-chosen lock token (distributed lock only)
    #[serde(default)]
    pub request_id: Option<String>,
    /// Deduplicate repeated submissions under this key
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl ClaimRequest {
    fn new(strategy: Strategy, resource: impl Into<String>) -> Self {
        Self {
            strategy,
            resource: resource.into(),
            expected_version: None,
            request_id: None,
            idempotency_key: None,
        }
    }

    /// Lock an agent
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self::new(Strategy::DistributedLock, agent_id)
    }

    /// Commit a slot at `expected_version`
    pub fn optimistic(slot: impl Into<String>, expected_version: u64) -> Self {
        Self {
            expected_version: Some(expected_version),
            ..Self::new(Strategy::Optimistic, slot)
        }
    }

    /// Hold a slot pessimistically
    pub fn pessimistic(slot: impl Into<String>) -> Self {
        Self::new(Strategy::Pessimistic, slot)
    }

    /// Use `request_id` as the lock token
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Deduplicate under `key`
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
