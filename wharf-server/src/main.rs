//! wharfd
//!
//! The wharf automation server: listens for webhook triggers, validates
//! and authorizes them against job definitions in the jobs directory, and
//! executes each accepted job in its own runner subprocess under a
//! bounded worker pool.

mod api;
mod auth;
mod config;
mod dispatcher;
mod executor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::executor::{JobExecutor, SubprocessExecutor};

#[derive(Parser)]
#[command(name = "wharfd", about = "Wharf automation server")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory containing job definition files
    #[arg(short = 'j', long = "jobs", default_value = ".")]
    jobs_dir: PathBuf,

    /// Maximum number of concurrently running jobs
    #[arg(short, long, default_value_t = 5)]
    workers: usize,

    /// Runner binary spawned once per job
    #[arg(long, default_value = "wharf-runner")]
    runner_bin: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "wharfd=debug,tower_http=debug"
    } else {
        "wharfd=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting wharfd");

    let config = Config {
        port: args.port,
        jobs_dir: args.jobs_dir,
        workers: args.workers,
        runner_bin: args.runner_bin,
    };
    config.validate()?;

    info!(
        "jobs directory: {}, workers: {}",
        config.jobs_dir.display(),
        config.workers
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(config.jobs_dir.clone(), tx);
    let job_executor: Arc<dyn JobExecutor> =
        Arc::new(SubprocessExecutor::new(config.runner_bin.clone()));
    tokio::spawn(dispatcher::run_dispatcher(rx, config.workers, job_executor));

    let app = api::create_router(Arc::new(AppState { dispatcher }));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!("listening on {}", config.bind_addr());

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
