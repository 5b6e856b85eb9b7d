//! ## mockfetch-telemetry::logging
//! **Structured logging with tracing**
//!
//! `EventLogger::init` installs the global subscriber once per process;
//! `RUST_LOG` wins over the configured default level.
//! Controller events are logged with OpenTelemetry-style key/value metadata.

use mockfetch_core::events::ControllerEvent;
use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Later calls are ignored.
    pub fn init(default_level: &str, json: bool) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let builder = fmt().with_env_filter(filter).with_target(false);
        let result = if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    }

    pub fn log_event(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!("controller_event", event_type = event_type, otel.kind = "INTERNAL");
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "Controller event");
    }

    /// Logs one lifecycle transition with the request's identifying fields.
    pub fn log_controller_event(event: &ControllerEvent) {
        Self::log_event(event.kind().as_str(), &Self::metadata(event));
    }

    pub fn metadata(event: &ControllerEvent) -> Vec<KeyValue> {
        let request = event.request();
        let mut metadata = vec![
            KeyValue::new("request.id", request.id.to_string()),
            KeyValue::new("request.name", request.name.clone()),
            KeyValue::new("request.latency_ms", as_i64(request.latency_ms)),
            KeyValue::new("request.elapsed_ms", as_i64(request.elapsed_ms)),
        ];
        if let Some(at) = request.expires_at {
            metadata.push(KeyValue::new("request.expires_at", as_i64(at)));
        }
        metadata
    }
}

fn as_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
