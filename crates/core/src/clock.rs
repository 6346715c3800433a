//! Time source for lock expiry
//!
//! Expiry is computed against a monotonic [`Instant`] so wall-clock jumps
//! never make a lock live longer or shorter than its TTL. The wall clock is
//! only used to stamp outcomes (`assigned_at`) and idempotency records.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic and wall time provider
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time, used for TTL arithmetic
    fn now(&self) -> Instant;

    /// Wall time, used for timestamps reported to callers
    fn wall(&self) -> DateTime<Utc>;
}

/// The process clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
///
/// Both readings advance together: `now()` is the creation instant plus the
/// accumulated offset and `wall()` is the creation wall time plus the same
/// offset.
///
/// # Examples
///
/// ```
/// use holdfast_core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let t0 = clock.now();
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now() - t0, Duration::from_secs(10));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a manual clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced since creation
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        // Offsets beyond chrono's range are not reachable in practice.
        self.wall_origin + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
    }
}
