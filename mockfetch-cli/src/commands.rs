use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mockfetch_config::MockFetchConfig;
use mockfetch_core::prelude::*;
use mockfetch_simulator::crud::PersonStore;
use mockfetch_simulator::replay::TimelineEntry;
use mockfetch_simulator::{ReplayEngine, ReplayReport, Scenario, Simulator};
use mockfetch_telemetry::{EventLogger, MetricsRecorder};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::CliError;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/mockfetch.yaml plus environment.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Print prometheus metrics on exit.
    #[arg(long, global = true)]
    pub metrics: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file and print its timeline
    Replay(ReplayArgs),
    /// Replay generated scenarios and check scheduling guarantees
    Fuzz(FuzzArgs),
    /// Run a scripted session against the demo person store
    Crud(CrudArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(short, long)]
    pub scenario: PathBuf,
    /// Fail unless the timeline hashes to this value
    #[arg(long)]
    pub validate_hash: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FuzzArgs {
    /// Initial seed (increments per iteration)
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Number of iterations (0 for unlimited)
    #[arg(long, default_value_t = 100)]
    pub iterations: usize,
    /// Requests per generated scenario
    #[arg(long, default_value_t = 16)]
    pub requests: usize,
}

#[derive(Args, Debug, Clone)]
pub struct CrudArgs {
    /// Overrides the configured latency
    #[arg(long)]
    pub latency_ms: Option<u64>,
}

pub fn run_replay(args: &ReplayArgs, metrics: &MetricsRecorder) -> CliResult {
    let scenario = Scenario::load_from_file(&args.scenario)?;
    let report = ReplayEngine::new(scenario)
        .with_metrics(metrics.clone())
        .run_blocking()?;
    print_report(&report);

    if !report.pending.is_empty() {
        warn!(pending = ?report.pending, "requests still in flight at the horizon");
    }
    if let Some(expected) = &args.validate_hash {
        if !expected.eq_ignore_ascii_case(&report.state_hash) {
            return Err(CliError::HashMismatch {
                expected: expected.clone(),
                actual: report.state_hash,
            }
            .into());
        }
        info!("state hash validated");
    }
    Ok(())
}

pub fn run_fuzz(args: &FuzzArgs, metrics: &MetricsRecorder) -> CliResult {
    let mut seed = args.seed;
    let mut count = 0;
    while args.iterations == 0 || count < args.iterations {
        let scenario = Simulator::new(seed, args.requests).scenario();
        let report = ReplayEngine::new(scenario)
            .with_metrics(metrics.clone())
            .run_blocking()?;
        if let Err(reason) = report.check_ordering() {
            return Err(CliError::FuzzFailure {
                iterations: count,
                reason: format!("seed {seed}: {reason}"),
            }
            .into());
        }
        info!(seed, hash = %report.state_hash, "scenario passed");
        seed += 1;
        count += 1;
    }
    println!("{count} scenarios passed");
    Ok(())
}

pub fn run_crud(
    args: &CrudArgs,
    config: &MockFetchConfig,
    metrics: &MetricsRecorder,
) -> CliResult {
    let mut settings = config.controller.settings();
    if let Some(latency_ms) = args.latency_ms {
        settings.latency = Duration::from_millis(latency_ms);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()?;
    let log = runtime.block_on(crud_session(settings, metrics))?;
    for entry in log.lock().iter() {
        println!("{entry}");
    }
    Ok(())
}

/// Lists, creates (pausing the create mid-flight), updates and deletes.
///
/// Requests always start running here: nothing in the script would resume
/// a request created paused, and the session would never finish.
async fn crud_session(
    mut settings: ControllerSettings,
    metrics: &MetricsRecorder,
) -> Result<Arc<Mutex<Vec<TimelineEntry>>>, Box<dyn std::error::Error + Send + Sync>> {
    if settings.new_requests_paused {
        warn!("start_paused is ignored by the scripted crud session");
        settings.new_requests_paused = false;
    }
    let controller = MockFetchController::new(settings)?;
    metrics.attach(controller.events());

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let clock = controller.clock();
    controller.events().subscribe_all(move |event: &ControllerEvent| {
        EventLogger::log_controller_event(event);
        sink.lock().push(TimelineEntry::from_event(clock.now_ms(), event));
    });

    let store = PersonStore::demo(controller.clone());
    store.list().await?;

    let half = controller.latency() / 2;
    let steer = async {
        tokio::time::sleep(half).await;
        if let Some(id) = controller.requests().first().map(|r| r.id) {
            controller.pause(id)?;
            tokio::time::sleep(controller.latency()).await;
            controller.resume(id)?;
        }
        Ok::<_, ControllerError>(())
    };
    let (created, steered) = tokio::join!(store.create("Roman", "Tisch"), steer);
    steered?;
    let created = created?;

    store.update(created.id, "Romana", "Tisch").await?;
    store.delete(1).await?;
    let persons = store.list().await?;
    info!(count = persons.len(), "crud session finished");
    Ok(log)
}

fn print_report(report: &ReplayReport) {
    println!("scenario {}", report.scenario);
    for entry in &report.timeline {
        println!("{entry}");
    }
    for label in &report.pending {
        println!("{:>8}ms pending            {}", report.final_ms, label);
    }
    println!("state hash {}", report.state_hash);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_replay_with_global_flags() {
        let cli = Cli::try_parse_from([
            "mockfetch",
            "replay",
            "--scenario",
            "s.yaml",
            "--metrics",
            "--validate-hash",
            "abc",
        ])
        .unwrap();
        assert!(cli.metrics);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.scenario, PathBuf::from("s.yaml"));
                assert_eq!(args.validate_hash.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn fuzz_defaults() {
        let cli = Cli::try_parse_from(["mockfetch", "fuzz"]).unwrap();
        match cli.command {
            Commands::Fuzz(args) => {
                assert_eq!(args.seed, 1);
                assert_eq!(args.iterations, 100);
                assert_eq!(args.requests, 16);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn replay_requires_a_scenario() {
        assert!(Cli::try_parse_from(["mockfetch", "replay"]).is_err());
    }

    #[test]
    fn fuzz_runs_a_few_seeds() {
        let metrics = MetricsRecorder::new().unwrap();
        let args = FuzzArgs {
            seed: 3,
            iterations: 3,
            requests: 4,
        };
        run_fuzz(&args, &metrics).unwrap();
        assert_eq!(metrics.transition_count(EventKind::NewRequest), 12);
        assert_eq!(metrics.transition_count(EventKind::RequestCompleted), 12);
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
    }

    #[test]
    fn crud_session_pauses_the_create() {
        let metrics = MetricsRecorder::new().unwrap();
        let settings = ControllerSettings::with_latency(Duration::from_millis(1_000));
        let log = paused_runtime()
            .block_on(crud_session(settings, &metrics))
            .unwrap();
        let log = log.lock();

        let kinds: Vec<String> = log.iter().map(|e| e.to_string()).collect();
        assert!(kinds
            .iter()
            .any(|k| k.contains("request-paused") && k.contains("POST /persons")));
        assert!(kinds.iter().any(|k| k.contains("DELETE /persons/1")));
        assert_eq!(metrics.transition_count(EventKind::RequestCompleted), 5);
        assert_eq!(metrics.in_flight.get(), 0);
    }

    #[test]
    fn crud_session_finishes_when_configured_to_start_paused() {
        let metrics = MetricsRecorder::new().unwrap();
        let settings = ControllerSettings {
            new_requests_paused: true,
            ..ControllerSettings::with_latency(Duration::from_millis(1_000))
        };
        // On the paused clock a stuck session would run into this timeout.
        let finished = paused_runtime().block_on(async {
            tokio::time::timeout(Duration::from_secs(3_600), crud_session(settings, &metrics))
                .await
        });

        assert!(finished.unwrap().is_ok());
        assert_eq!(metrics.transition_count(EventKind::RequestCompleted), 5);
        assert_eq!(metrics.in_flight.get(), 0);
    }

    #[test]
    fn mismatched_hash_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
name: one
latency_ms: 100
steps:
  - at_ms: 0
    action: fetch
    label: a
    url: /persons
"#,
        )
        .unwrap();

        let metrics = MetricsRecorder::new().unwrap();
        let args = ReplayArgs {
            scenario: file.path().to_path_buf(),
            validate_hash: Some("00".into()),
        };
        let err = run_replay(&args, &metrics).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
        assert_eq!(metrics.transition_count(EventKind::RequestCompleted), 1);
    }
}
