//! ## mockfetch-core::time
//! **Millisecond clock for the controller**
//!
//! Times are milliseconds since the controller's epoch. The clock reads
//! `tokio::time::Instant`, so tests drive it with tokio's paused time
//! (`start_paused`, `tokio::time::advance`).

use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct SimClock {
    epoch: Instant,
}

impl SimClock {
    /// Starts a clock at the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the epoch, rounded down.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The instant at which the clock reads `at_ms`.
    #[inline]
    pub fn deadline(&self, at_ms: u64) -> Instant {
        self.epoch + Duration::from_millis(at_ms)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
