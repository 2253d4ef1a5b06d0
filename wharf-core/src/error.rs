//! Error types for the job engine
//!
//! Validation failures happen at queue-build time, before any side effect;
//! execution failures abort a running job. A clean early stop is not an
//! error and is modeled in `TaskFlow`/`JobOutcome` instead.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// A task's preconditions were unmet when it was added to a job
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("task has an empty command")]
    EmptyCommand,

    #[error("no connection available: task has no override and the job has no default connection")]
    NoConnection,

    #[error("private key file not found: {0}")]
    MissingKeyFile(PathBuf),

    #[error("unsupported repository url '{0}': expected ssh:// (with a connection) or http(s)://")]
    UnsupportedRepoUrl(String),

    #[error("task is missing required field '{0}'")]
    MissingField(&'static str),
}

/// A fault raised while a task runs, aborting the job as failed
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("no connection resolved for task")]
    NoConnection,

    #[error("missing or malformed webhook payload: {0}")]
    Payload(String),

    #[error("missing job property '{0}'")]
    MissingProp(&'static str),

    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
