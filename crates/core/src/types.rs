//! Identity types for reservations
//!
//! This module defines the identities every subsystem is keyed by:
//! - [`ResourceKey`]: validated name of a lockable/versioned resource
//! - [`SlotId`]: numeric slot identity from the slot catalog
//! - [`IdempotencyKey`]: caller-supplied deduplication key
//! - [`LockToken`]: opaque holder token for the distributed lock manager

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length in bytes of any caller-supplied identity
pub const MAX_IDENTITY_LEN: usize = 256;

fn validate_identity(raw: &str) -> std::result::Result<(), String> {
    if raw.is_empty() {
        return Err("must not be empty".into());
    }
    if raw.len() > MAX_IDENTITY_LEN {
        return Err(format!("longer than {} bytes", MAX_IDENTITY_LEN));
    }
    if raw.chars().any(char::is_control) {
        return Err("contains control characters".into());
    }
    Ok(())
}

fn truncated(raw: &str) -> String {
    raw.chars().take(64).collect()
}

/// Name of a resource that can be locked, versioned or held
///
/// Resource keys are namespaced strings such as `agent:agent_1` or
/// `slot:3`. Each subsystem partitions its own key space, so the same key
/// may appear in the lock manager and the version store independently.
///
/// # Examples
///
/// ```
/// use holdfast_core::ResourceKey;
///
/// let key = ResourceKey::namespaced("agent", "agent_1").unwrap();
/// assert_eq!(key.as_str(), "agent:agent_1");
/// assert!(ResourceKey::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a validated resource key
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_identity(&raw).map_err(|reason| Error::InvalidResource {
            id: truncated(&raw),
            reason,
        })?;
        Ok(ResourceKey(raw))
    }

    /// Create `namespace:id`, validating `id` on its own first
    pub fn namespaced(namespace: &str, id: &str) -> Result<Self> {
        validate_identity(id).map_err(|reason| Error::InvalidResource {
            id: truncated(id),
            reason,
        })?;
        Self::new(format!("{}:{}", namespace, id))
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a bookable slot
///
/// Slots are numbered from 1. The slot catalog seeds `1..=N` at startup.
///
/// # Examples
///
/// ```
/// use holdfast_core::SlotId;
///
/// let id: SlotId = "7".parse().unwrap();
/// assert_eq!(id.get(), 7);
/// assert!("0".parse::<SlotId>().is_err());
/// assert!("seven".parse::<SlotId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Create a slot id, rejecting zero
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidResource {
                id: "0".into(),
                reason: "slot ids start at 1".into(),
            });
        }
        Ok(SlotId(id))
    }

    /// Numeric value
    pub fn get(self) -> u32 {
        self.0
    }

    /// Resource key used by the slot strategies (`slot:{id}`)
    pub fn resource_key(self) -> ResourceKey {
        ResourceKey(format!("slot:{}", self.0))
    }

    /// Agent assigned to this slot in the seeded catalog
    pub fn default_agent(self) -> String {
        format!("agent_{}", self.0)
    }
}

impl FromStr for SlotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim().parse::<u32>().map_err(|e| Error::InvalidResource {
            id: truncated(s),
            reason: format!("not a slot number ({})", e),
        })?;
        SlotId::new(id)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied key that deduplicates repeated submissions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Create a validated idempotency key
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_identity(&raw)
            .map_err(|reason| Error::invalid_parameter("idempotency_key", reason))?;
        Ok(IdempotencyKey(raw))
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holder token bound to a single lock acquisition
///
/// Generated tokens are random UUID v4 strings. Callers may also bring
/// their own request id, which then doubles as the token.
///
/// # Examples
///
/// ```
/// use holdfast_core::LockToken;
///
/// let a = LockToken::generate();
/// let b = LockToken::generate();
/// assert_ne!(a, b);
///
/// let req = LockToken::from_request_id("req-42").unwrap();
/// assert_eq!(req.as_str(), "req-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Create a fresh random token
    pub fn generate() -> Self {
        LockToken(Uuid::new_v4().to_string())
    }

    /// Use a caller-provided request id as the token
    pub fn from_request_id(request_id: impl Into<String>) -> Result<Self> {
        let raw = request_id.into();
        validate_identity(&raw).map_err(|reason| Error::invalid_parameter("request_id", reason))?;
        Ok(LockToken(raw))
    }

    /// Borrow the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
