//! Wharf Runner
//!
//! Executes exactly one job and exits. The dispatcher spawns one runner
//! process per accepted trigger; the process boundary is the isolation
//! mechanism between concurrent job runs.
//!
//! The runner loads the job definition, switches into a fresh temporary
//! working directory (so clone targets and build contexts never collide
//! across runs), runs the task queue to a terminal outcome, and reports it
//! through the exit code: 0 for a completed or cleanly stopped run, 1 for
//! a failed run, 2 when the definition or parameters could not be loaded.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wharf_core::JobOutcome;
use wharf_lua::load_definition;

#[derive(Parser)]
#[command(name = "wharf-runner", about = "Runs a single wharf job to completion")]
struct Args {
    /// Path to the job definition to run
    job_file: PathBuf,

    /// Job parameters as a JSON object
    params: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wharf_runner=info,job=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(JobOutcome::Completed) => {
            info!("job completed");
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::Stopped(reason)) => {
            info!("job stopped early: {}", reason);
            ExitCode::SUCCESS
        }
        Ok(JobOutcome::Failed(err)) => {
            error!("job failed: {}", err);
            ExitCode::from(1)
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<JobOutcome> {
    let params: Map<String, Value> =
        serde_json::from_str(&args.params).context("params must be a JSON object")?;

    let mut definition = load_definition(&args.job_file)
        .with_context(|| format!("failed to load {}", args.job_file.display()))?;

    // Fresh working directory per run; removed when the process exits
    let workdir = TempDir::new().context("failed to create working directory")?;
    std::env::set_current_dir(workdir.path()).with_context(|| {
        format!("failed to enter working directory {}", workdir.path().display())
    })?;

    info!(
        "running {} in {}",
        args.job_file.display(),
        workdir.path().display()
    );

    Ok(definition.run(params))
}
