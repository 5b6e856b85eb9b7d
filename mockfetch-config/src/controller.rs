//! Simulated request scheduling parameters.

use std::time::Duration;

use mockfetch_core::settings::{ControllerSettings, DEFAULT_LATENCY, DEFAULT_RESOLUTION_TOLERANCE};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Controller configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Latency applied to each new request (ms).
    #[serde(default = "default_latency_ms")]
    #[validate(range(max = 600_000))]
    pub latency_ms: u64,

    /// Window within which due requests resolve together (ms).
    #[serde(default = "default_tolerance_ms")]
    #[validate(range(max = 1_000))]
    pub resolution_tolerance_ms: u64,

    /// Create new requests already paused.
    #[serde(default)]
    pub start_paused: bool,
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY.as_millis() as u64
}

fn default_tolerance_ms() -> u64 {
    DEFAULT_RESOLUTION_TOLERANCE.as_millis() as u64
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            resolution_tolerance_ms: default_tolerance_ms(),
            start_paused: false,
        }
    }
}

impl From<&ControllerConfig> for ControllerSettings {
    fn from(config: &ControllerConfig) -> Self {
        ControllerSettings {
            latency: Duration::from_millis(config.latency_ms),
            resolution_tolerance: Duration::from_millis(config.resolution_tolerance_ms),
            new_requests_paused: config.start_paused,
        }
    }
}

impl ControllerConfig {
    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings::from(self)
    }
}
