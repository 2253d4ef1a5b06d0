//! Loader errors
//!
//! Everything that can go wrong between a job name and a runnable
//! definition: the artifact may be missing, unreadable, invalid Lua, the
//! wrong shape, or a task may fail add-time validation while the queue is
//! being built.

use std::path::PathBuf;
use thiserror::Error;

use wharf_core::ValidationError;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("job definition not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read job definition {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to evaluate job definition: {0}")]
    Eval(#[from] mlua::Error),

    #[error("invalid job definition: {0}")]
    Invalid(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
