//! Job execution seam
//!
//! The dispatcher hands accepted triggers to a `JobExecutor`. The real
//! implementation spawns one runner process per trigger and waits for it;
//! tests substitute an in-memory executor to observe scheduling behavior.
//!
//! The two failure kinds are deliberately distinct: failing to launch the
//! runner is an infrastructure problem, while a non-zero exit is the job
//! itself failing. Neither is retried.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch runner: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("job process exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// Runs one job to completion with the given parameters
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job_file: &Path, params: &Map<String, Value>) -> Result<(), RunError>;
}

/// Spawns the runner binary as an isolated subprocess per job
///
/// The runner receives the definition path and the serialized parameters
/// on its command line, and communicates its outcome only through the
/// exit status. No state is shared with the server process.
pub struct SubprocessExecutor {
    runner_bin: PathBuf,
}

impl SubprocessExecutor {
    pub fn new(runner_bin: PathBuf) -> Self {
        Self { runner_bin }
    }
}

#[async_trait]
impl JobExecutor for SubprocessExecutor {
    async fn execute(&self, job_file: &Path, params: &Map<String, Value>) -> Result<(), RunError> {
        let params_json = Value::Object(params.clone()).to_string();

        debug!(
            "spawning {} {}",
            self.runner_bin.display(),
            job_file.display()
        );

        let status = Command::new(&self.runner_bin)
            .arg(job_file)
            .arg(params_json)
            .status()
            .await?;

        if !status.success() {
            return Err(RunError::Failed(status));
        }
        Ok(())
    }
}
