//! Server configuration
//!
//! Collected from the CLI and validated once at startup.

use std::path::PathBuf;

/// Runtime configuration for the wharfd daemon
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the webhook listener binds
    pub port: u16,

    /// Directory containing `<job_name>.lua` definition files
    pub jobs_dir: PathBuf,

    /// Maximum number of concurrently running job processes
    pub workers: usize,

    /// Runner binary spawned once per accepted trigger
    pub runner_bin: PathBuf,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if !self.jobs_dir.is_dir() {
            anyhow::bail!(
                "jobs directory {} does not exist",
                self.jobs_dir.display()
            );
        }

        if self.runner_bin.as_os_str().is_empty() {
            anyhow::bail!("runner binary path cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            jobs_dir: PathBuf::from("."),
            workers: 5,
            runner_bin: PathBuf::from("wharf-runner"),
        }
    }
}
