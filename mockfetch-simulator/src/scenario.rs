//! Scripted controller sessions.
//!
//! A scenario is a list of timed steps applied to a fresh controller. Requests
//! are named by labels local to the scenario, so pause/resume steps can refer
//! to requests created earlier.
//!
//! ```yaml
//! name: pause-and-resume
//! latency_ms: 3000
//! steps:
//!   - at_ms: 0
//!     action: fetch
//!     label: list
//!     url: /persons
//!   - at_ms: 1500
//!     action: pause
//!     label: list
//!   - at_ms: 11500
//!     action: resume
//!     label: list
//! ```

use std::collections::HashSet;
use std::path::Path;

use mockfetch_core::settings::{DEFAULT_LATENCY, DEFAULT_RESOLUTION_TOLERANCE};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ScenarioError;

/// Simulated time after which undrained requests are reported as pending.
pub const DEFAULT_HORIZON_MS: u64 = 10 * 60 * 1_000;

/// Upper bound (exclusive) for latencies picked by [`Scenario::random`].
const RANDOM_MAX_LATENCY_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
    #[serde(default = "default_horizon_ms")]
    pub horizon_ms: u64,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioAction {
    Fetch {
        label: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Pause {
        label: String,
    },
    Resume {
        label: String,
    },
    SetLatency {
        ms: u64,
    },
    SetNewRequestsPaused {
        paused: bool,
    },
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY.as_millis() as u64
}

fn default_tolerance_ms() -> u64 {
    DEFAULT_RESOLUTION_TOLERANCE.as_millis() as u64
}

fn default_horizon_ms() -> u64 {
    DEFAULT_HORIZON_MS
}

impl Scenario {
    pub fn new(name: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            name: name.into(),
            latency_ms,
            tolerance_ms: default_tolerance_ms(),
            horizon_ms: DEFAULT_HORIZON_MS,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, at_ms: u64, action: ScenarioAction) -> Self {
        self.steps.push(ScenarioStep { at_ms, action });
        self
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_yaml(&self) -> Result<String, ScenarioError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Steps must be in time order, fetch labels unique, and every label
    /// defined before a pause or resume uses it.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.steps.windows(2).any(|w| w[0].at_ms > w[1].at_ms) {
            return Err(ScenarioError::Validation(
                "steps must be sorted by at_ms".into(),
            ));
        }
        if self.horizon_ms < self.steps.last().map_or(0, |s| s.at_ms) {
            return Err(ScenarioError::Validation(
                "horizon_ms ends before the last step".into(),
            ));
        }

        let mut labels = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            match &step.action {
                ScenarioAction::Fetch { label, .. } => {
                    if !labels.insert(label.as_str()) {
                        return Err(ScenarioError::Validation(format!(
                            "step {index}: label '{label}' already used"
                        )));
                    }
                }
                ScenarioAction::Pause { label } | ScenarioAction::Resume { label } => {
                    if !labels.contains(label.as_str()) {
                        return Err(ScenarioError::Validation(format!(
                            "step {index}: label '{label}' is not defined yet"
                        )));
                    }
                }
                ScenarioAction::SetLatency { .. }
                | ScenarioAction::SetNewRequestsPaused { .. } => {}
            }
        }
        Ok(())
    }

    /// Builds a random but valid scenario from `seed`.
    pub fn random(seed: u64, requests: usize) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut scenario = Scenario::new(format!("random-{seed}"), 1_000);
        let mut at_ms = 0;
        let mut labels: Vec<String> = Vec::new();

        while labels.len() < requests {
            at_ms += rng.random_range(0..400u64);
            let action = match rng.random_range(0..10u8) {
                0..=4 => {
                    let label = format!("r{}", labels.len());
                    labels.push(label.clone());
                    ScenarioAction::Fetch {
                        label,
                        url: "/persons".into(),
                        method: None,
                        body: None,
                    }
                }
                5 if !labels.is_empty() => ScenarioAction::Pause {
                    label: pick(&mut rng, &labels),
                },
                6 | 7 if !labels.is_empty() => ScenarioAction::Resume {
                    label: pick(&mut rng, &labels),
                },
                8 => ScenarioAction::SetLatency {
                    ms: rng.random_range(20..RANDOM_MAX_LATENCY_MS),
                },
                _ => continue,
            };
            scenario.steps.push(ScenarioStep { at_ms, action });
        }

        // Leave nothing paused: resume every label once at the end.
        at_ms += 1;
        for label in labels {
            scenario.steps.push(ScenarioStep {
                at_ms,
                action: ScenarioAction::Resume { label },
            });
        }
        // Long scripts outgrow the default horizon; leave room for the last
        // resumed request to drain.
        scenario.horizon_ms = scenario
            .horizon_ms
            .max(at_ms + RANDOM_MAX_LATENCY_MS + scenario.tolerance_ms);
        scenario
    }
}

fn pick(rng: &mut SmallRng, labels: &[String]) -> String {
    labels[rng.random_range(0..labels.len())].clone()
}
