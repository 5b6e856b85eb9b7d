//! ## mockfetch-cli
//! **Command line front end for the simulated request controller**
//!
//! Replays scenario files, fuzzes the scheduler with seeded random scenarios
//! and runs a scripted CRUD session against the demo person store.

use clap::Parser;
use mockfetch_config::MockFetchConfig;
use mockfetch_telemetry::{EventLogger, MetricsRecorder};

mod commands;
mod error;

use commands::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => MockFetchConfig::load_from_path(path)?,
        None => MockFetchConfig::load()?,
    };
    EventLogger::init(&config.telemetry.log_level, config.telemetry.json_logs);
    let metrics = MetricsRecorder::new()?;

    match &cli.command {
        Commands::Replay(args) => commands::run_replay(args, &metrics)?,
        Commands::Fuzz(args) => commands::run_fuzz(args, &metrics)?,
        Commands::Crud(args) => commands::run_crud(args, &config, &metrics)?,
    }

    if cli.metrics || config.telemetry.print_metrics {
        print!("{}", metrics.gather_metrics()?);
    }
    Ok(())
}
