//! Reservation service configuration
//!
//! Loaded from TOML or built in code. Every field has a default, so an
//! empty document is a valid configuration. Durations are milliseconds.
//!
//! ```toml
//! lock_ttl_ms = 10000
//! release_after_reserve = false
//! seeded_slots = 10
//! missing_slot_policy = "auto_init"   # or "reject"
//! exclusive_booking = false
//! idempotency_ttl_ms = 86400000
//! idempotency_capacity = 100000
//! sweep_interval_ms = 1000            # 0 disables the background sweeper
//! ```

use holdfast_concurrency::{IdempotencyRetention, MissingKeyPolicy};
use holdfast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default TTL for agent locks
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Longest accepted agent lock TTL (one year)
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default number of slots seeded at startup and on reset
pub const DEFAULT_SEEDED_SLOTS: u32 = 10;

/// Default background sweep cadence
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Reservation service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReservationConfig {
    /// TTL applied to agent locks
    #[serde(rename = "lock_ttl_ms", with = "millis")]
    pub lock_ttl: Duration,

    /// Release the agent lock as soon as the reservation is recorded
    ///
    /// When false the lock stays until its TTL lapses or the holder
    /// releases it.
    pub release_after_reserve: bool,

    /// Slots `1..=seeded_slots` exist at startup and after reset
    pub seeded_slots: u32,

    /// How slots outside the seeded catalog are treated
    pub missing_slot_policy: MissingKeyPolicy,

    /// Reject claims on a slot that is already booked
    pub exclusive_booking: bool,

    /// How long idempotency records are replayed
    #[serde(rename = "idempotency_ttl_ms", with = "millis")]
    pub idempotency_ttl: Duration,

    /// Maximum idempotency records kept
    pub idempotency_capacity: usize,

    /// Background sweep cadence; zero disables the sweeper thread
    #[serde(rename = "sweep_interval_ms", with = "millis")]
    pub sweep_interval: Duration,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        let retention = IdempotencyRetention::default();
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            release_after_reserve: false,
            seeded_slots: DEFAULT_SEEDED_SLOTS,
            missing_slot_policy: MissingKeyPolicy::AutoInit,
            exclusive_booking: false,
            idempotency_ttl: retention.ttl,
            idempotency_capacity: retention.capacity,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ReservationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl.is_zero() {
            return Err(Error::Config("lock_ttl_ms must be greater than zero".into()));
        }
        if self.lock_ttl > MAX_LOCK_TTL {
            return Err(Error::Config(format!(
                "lock_ttl_ms must be at most {}",
                MAX_LOCK_TTL.as_millis()
            )));
        }
        if self.idempotency_ttl.is_zero() {
            return Err(Error::Config(
                "idempotency_ttl_ms must be greater than zero".into(),
            ));
        }
        if self.idempotency_capacity == 0 {
            return Err(Error::Config(
                "idempotency_capacity must be greater than zero".into(),
            ));
        }
        if self.missing_slot_policy == MissingKeyPolicy::Reject && self.seeded_slots == 0 {
            return Err(Error::Config(
                "missing_slot_policy = \"reject\" with no seeded slots rejects every slot".into(),
            ));
        }
        Ok(())
    }

    /// Idempotency retention derived from this config
    pub fn idempotency_retention(&self) -> IdempotencyRetention {
        IdempotencyRetention {
            ttl: self.idempotency_ttl,
            capacity: self.idempotency_capacity,
        }
    }
}
