//! # mockfetch Telemetry
//!
//! Logging and metrics for the simulated request controller.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
