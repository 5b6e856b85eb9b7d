//! Controller construction parameters.

use std::time::Duration;

/// Slack within which a running request counts as expired: one animation frame.
pub const DEFAULT_RESOLUTION_TOLERANCE: Duration = Duration::from_millis(16);

/// Latency applied to new requests unless configured otherwise.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Latency captured by each new request.
    pub latency: Duration,
    /// Requests expiring within this window of "now" resolve together.
    pub resolution_tolerance: Duration,
    /// Create new requests already paused.
    pub new_requests_paused: bool,
}

impl ControllerSettings {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            resolution_tolerance: DEFAULT_RESOLUTION_TOLERANCE,
            new_requests_paused: false,
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
