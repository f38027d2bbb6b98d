//! Time sources.
//!
//! Store and presence timestamps use a monotonic session clock so expiry
//! and staleness follow tokio time (and pause with it in tests). Wire and
//! conflict timestamps use wall-clock Unix milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Monotonic milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Current Unix time in milliseconds (0 if the system clock is before 1970).
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Whole milliseconds of a duration, saturating.
pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
