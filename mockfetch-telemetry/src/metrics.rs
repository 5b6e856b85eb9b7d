//! ## mockfetch-telemetry::metrics
//! **Prometheus counters for controller activity**

use mockfetch_core::events::{ControllerEvent, EventBus, EventKind, ListenerId};
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub transitions: IntCounterVec,
    pub in_flight: IntGauge,
    pub request_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let transitions = IntCounterVec::new(
            Opts::new("mockfetch_transitions_total", "Request lifecycle transitions"),
            &["kind"],
        )?;
        let in_flight = IntGauge::new("mockfetch_in_flight", "Requests not yet completed")?;
        let request_latency = Histogram::with_opts(
            HistogramOpts::new(
                "mockfetch_request_latency_ms",
                "Configured latency of completed requests",
            )
            .buckets(vec![100.0, 500.0, 1_000.0, 3_000.0, 10_000.0]),
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;

        Ok(Self {
            registry,
            transitions,
            in_flight,
            request_latency,
        })
    }

    pub fn observe(&self, event: &ControllerEvent) {
        let kind = event.kind();
        self.transitions.with_label_values(&[kind.as_str()]).inc();
        match kind {
            EventKind::NewRequest => self.in_flight.inc(),
            EventKind::RequestCompleted => {
                self.in_flight.dec();
                self.request_latency
                    .observe(event.request().latency_ms as f64);
            }
            EventKind::RequestPaused | EventKind::RequestResumed => {}
        }
    }

    /// Subscribes this recorder to every event on `bus`.
    pub fn attach(&self, bus: &EventBus) -> ListenerId {
        let recorder = self.clone();
        bus.subscribe_all(move |event| recorder.observe(event))
    }

    pub fn transition_count(&self, kind: EventKind) -> u64 {
        self.transitions.with_label_values(&[kind.as_str()]).get()
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockfetch_core::prelude::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn counts_controller_transitions() {
        let controller =
            MockFetchController::new(ControllerSettings::with_latency(Duration::from_millis(100)))
                .unwrap();
        let metrics = MetricsRecorder::new().unwrap();
        metrics.attach(controller.events());

        let handle = controller.fetch("/persons", RequestInit::get());
        controller.pause(handle.id()).unwrap();
        assert_eq!(metrics.in_flight.get(), 1);

        controller.resume(handle.id()).unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        handle.await.unwrap();

        assert_eq!(metrics.transition_count(EventKind::NewRequest), 1);
        assert_eq!(metrics.transition_count(EventKind::RequestPaused), 1);
        assert_eq!(metrics.transition_count(EventKind::RequestResumed), 1);
        assert_eq!(metrics.transition_count(EventKind::RequestCompleted), 1);
        assert_eq!(metrics.in_flight.get(), 0);
        assert_eq!(metrics.request_latency.get_sample_count(), 1);
    }

    #[test]
    fn exposition_names_metrics() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.transitions.with_label_values(&["new-request"]).inc();
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("mockfetch_transitions_total"));
        assert!(text.contains("mockfetch_in_flight"));
    }
}
