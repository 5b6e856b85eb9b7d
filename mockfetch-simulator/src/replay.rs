//! Replay module.
//!
//! Plays a [`Scenario`] against a fresh controller on a paused tokio clock:
//! simulated time jumps straight to the next step or timer, so a scenario
//! spanning minutes replays instantly and identically on every run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blake3::Hasher;
use mockfetch_core::prelude::*;
use mockfetch_core::time::SimClock;
use mockfetch_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::timeout_at;
use tracing::{debug, info, instrument};

use crate::scenario::{Scenario, ScenarioAction};
use crate::ScenarioError;

/// What happened at one point of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    Controller {
        kind: EventKind,
        request: RequestId,
        name: String,
        expires_at: Option<u64>,
    },
    /// A step the controller refused, e.g. resuming a running request.
    Rejected { step: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

impl TimelineEntry {
    pub fn from_event(at_ms: u64, event: &ControllerEvent) -> Self {
        let request = event.request();
        Self {
            at_ms,
            event: TimelineEvent::Controller {
                kind: event.kind(),
                request: request.id,
                name: request.name.clone(),
                expires_at: request.expires_at,
            },
        }
    }
}

impl fmt::Display for TimelineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            TimelineEvent::Controller {
                kind,
                request,
                name,
                expires_at,
            } => {
                write!(f, "{:>8}ms {:<18} #{} {}", self.at_ms, kind, request, name)?;
                if let Some(at) = expires_at {
                    write!(f, " (expires {}ms)", at)?;
                }
                Ok(())
            }
            TimelineEvent::Rejected { step, reason } => {
                write!(
                    f,
                    "{:>8}ms {:<18} step {}: {}",
                    self.at_ms, "rejected", step, reason
                )
            }
        }
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub scenario: String,
    pub tolerance_ms: u64,
    pub timeline: Vec<TimelineEntry>,
    /// Labels still in flight when the horizon was reached.
    pub pending: Vec<String>,
    pub final_ms: u64,
    pub state_hash: String,
}

impl ReplayReport {
    fn new(
        scenario: &Scenario,
        timeline: Vec<TimelineEntry>,
        pending: Vec<String>,
        final_ms: u64,
    ) -> Self {
        let mut hasher = Hasher::new();
        for entry in &timeline {
            hasher.update(entry.to_string().as_bytes());
            hasher.update(b"\n");
        }
        for label in &pending {
            hasher.update(b"pending ");
            hasher.update(label.as_bytes());
        }
        Self {
            scenario: scenario.name.clone(),
            tolerance_ms: scenario.tolerance_ms,
            timeline,
            pending,
            final_ms,
            state_hash: hex::encode(hasher.finalize().as_bytes()),
        }
    }

    /// Completion entries in the order they were observed.
    pub fn completions(&self) -> impl Iterator<Item = (u64, RequestId, Option<u64>)> + '_ {
        self.timeline.iter().filter_map(|entry| match &entry.event {
            TimelineEvent::Controller {
                kind: EventKind::RequestCompleted,
                request,
                expires_at,
                ..
            } => Some((entry.at_ms, *request, *expires_at)),
            _ => None,
        })
    }

    pub fn rejections(&self) -> usize {
        self.timeline
            .iter()
            .filter(|e| matches!(e.event, TimelineEvent::Rejected { .. }))
            .count()
    }

    /// Checks the scheduling guarantees against the recorded timeline:
    /// nothing completes early or twice, and completions follow expiration
    /// order up to the tolerance window.
    pub fn check_ordering(&self) -> Result<(), String> {
        let tolerance = self.tolerance_ms;
        let mut seen = std::collections::HashSet::new();
        let mut previous: Option<u64> = None;

        for (at_ms, request, expires_at) in self.completions() {
            if !seen.insert(request) {
                return Err(format!("request {request} completed twice"));
            }
            let expires_at =
                expires_at.ok_or_else(|| format!("request {request} completed while paused"))?;
            if at_ms + tolerance < expires_at {
                return Err(format!(
                    "request {request} completed at {at_ms}ms, due at {expires_at}ms"
                ));
            }
            if let Some(prev) = previous {
                if expires_at + tolerance < prev {
                    return Err(format!(
                        "request {request} (due {expires_at}ms) completed after one due {prev}ms"
                    ));
                }
            }
            previous = Some(previous.map_or(expires_at, |p| p.max(expires_at)));
        }
        Ok(())
    }
}

pub struct ReplayEngine {
    scenario: Scenario,
    metrics: Option<MetricsRecorder>,
}

impl ReplayEngine {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            metrics: None,
        }
    }

    /// Feeds every controller event of the replay into `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Runs the scenario on its own paused-clock runtime.
    pub fn run_blocking(&self) -> Result<ReplayReport, ScenarioError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()?;
        runtime.block_on(self.run())
    }

    /// Runs the scenario. Expects a current-thread runtime with paused time;
    /// on a real clock the replay takes as long as the scenario says.
    #[instrument(
        level = "info",
        name = "replay",
        skip(self),
        fields(scenario = %self.scenario.name)
    )]
    pub async fn run(&self) -> Result<ReplayReport, ScenarioError> {
        let scenario = &self.scenario;
        scenario.validate()?;

        let controller = MockFetchController::new(ControllerSettings {
            latency: Duration::from_millis(scenario.latency_ms),
            resolution_tolerance: Duration::from_millis(scenario.tolerance_ms),
            new_requests_paused: false,
        })?;
        let clock = controller.clock();

        let timeline = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&timeline);
        controller.events().subscribe_all(move |event: &ControllerEvent| {
            let entry = TimelineEntry::from_event(clock.now_ms(), event);
            debug!(%entry, "timeline");
            recorder.lock().push(entry);
        });
        if let Some(metrics) = &self.metrics {
            metrics.attach(controller.events());
        }

        let mut ids: HashMap<&str, RequestId> = HashMap::new();
        let mut handles: Vec<(&str, CompletionHandle)> = Vec::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            sleep_until_ms(&clock, step.at_ms).await;

            let outcome = match &step.action {
                ScenarioAction::Fetch {
                    label,
                    url,
                    method,
                    body,
                } => {
                    let mut init = RequestInit {
                        method: method.clone(),
                        ..RequestInit::default()
                    };
                    if let Some(body) = body {
                        init = init.body(body.clone());
                    }
                    let handle = controller.fetch(url.as_str(), init);
                    ids.insert(label.as_str(), handle.id());
                    handles.push((label.as_str(), handle));
                    Ok(())
                }
                ScenarioAction::Pause { label } => controller.pause(lookup(&ids, label)?),
                ScenarioAction::Resume { label } => controller.resume(lookup(&ids, label)?),
                ScenarioAction::SetLatency { ms } => {
                    controller.set_latency(Duration::from_millis(*ms));
                    Ok(())
                }
                ScenarioAction::SetNewRequestsPaused { paused } => {
                    controller.set_new_requests_paused(*paused);
                    Ok(())
                }
            };

            if let Err(err) = outcome {
                debug!(step = index, %err, "step rejected");
                timeline.lock().push(TimelineEntry {
                    at_ms: clock.now_ms(),
                    event: TimelineEvent::Rejected {
                        step: index,
                        reason: err.to_string(),
                    },
                });
            }
        }

        let horizon = clock.deadline(scenario.horizon_ms);
        let mut pending = Vec::new();
        for (label, mut handle) in handles {
            match timeout_at(horizon, &mut handle).await {
                Ok(result) => result?,
                Err(_) => pending.push(label.to_owned()),
            }
        }

        let final_ms = clock.now_ms();
        let timeline = std::mem::take(&mut *timeline.lock());
        let report = ReplayReport::new(scenario, timeline, pending, final_ms);
        info!(
            entries = report.timeline.len(),
            pending = report.pending.len(),
            hash = %report.state_hash,
            "replay complete"
        );
        Ok(report)
    }
}

fn lookup(ids: &HashMap<&str, RequestId>, label: &str) -> Result<RequestId, ScenarioError> {
    ids.get(label)
        .copied()
        .ok_or_else(|| ScenarioError::Validation(format!("label '{label}' is not defined yet")))
}

async fn sleep_until_ms(clock: &SimClock, at_ms: u64) {
    if at_ms > clock.now_ms() {
        tokio::time::sleep_until(clock.deadline(at_ms)).await;
    }
}
