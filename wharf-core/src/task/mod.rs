//! The closed set of task variants
//!
//! Every task implements the same two-phase capability: `validate` runs
//! once, side-effect free, when the task is appended to a job's queue;
//! `run` performs the actual effect and reports how the pipeline should
//! proceed via `TaskFlow`.
//!
//! Tasks inserted dynamically by an `Expand` task bypass `validate`; the
//! connection-using variants therefore resolve their connection again at
//! run time and fail with a precise execution error if none is available.

mod cmd;
mod git;
mod hook;
mod image;
mod rsync;
mod ssh;

pub use cmd::{CmdTask, CommandLine};
pub use git::{CheckoutTask, WebhookCheckoutTask};
pub use hook::{CallbackTask, ExpandTask, HookFn};
pub use image::{ImageBuildTask, ImagePushTask, ImageTagTask};
pub use rsync::RsyncTask;
pub use ssh::SshTask;

use std::fmt;
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::connection::Connection;
use crate::error::{ExecutionError, ValidationError};
use crate::job::Job;

/// How the run loop proceeds after a task returns
pub enum TaskFlow {
    /// Proceed to the next queued task
    Continue,
    /// Prepend these tasks (first runs next), then proceed
    Insert(Vec<Task>),
    /// Terminate the pipeline cleanly, skipping all remaining tasks
    Stop(String),
}

impl fmt::Debug for TaskFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFlow::Continue => f.write_str("Continue"),
            TaskFlow::Insert(tasks) => write!(f, "Insert({} tasks)", tasks.len()),
            TaskFlow::Stop(reason) => write!(f, "Stop({reason:?})"),
        }
    }
}

/// One step in a job's pipeline
pub enum Task {
    Cmd(CmdTask),
    Ssh(SshTask),
    Checkout(CheckoutTask),
    WebhookCheckout(WebhookCheckoutTask),
    Rsync(RsyncTask),
    Callback(CallbackTask),
    Expand(ExpandTask),
    ImageBuild(ImageBuildTask),
    ImageTag(ImageTagTask),
    ImagePush(ImagePushTask),
}

impl Task {
    /// Asserts the task's preconditions against the current job state
    ///
    /// Called exactly once, when the task is appended via `Job::add_task`.
    pub fn validate(&self, job: &Job) -> Result<(), ValidationError> {
        match self {
            Task::Cmd(task) => task.validate(),
            Task::Ssh(task) => task.validate(job),
            Task::Checkout(task) => task.validate(job),
            Task::WebhookCheckout(task) => task.validate(job),
            Task::Rsync(task) => task.validate(job),
            Task::Callback(_) | Task::Expand(_) => Ok(()),
            Task::ImageBuild(_) | Task::ImageTag(_) | Task::ImagePush(_) => Ok(()),
        }
    }

    /// Performs the task's effect
    pub fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        match self {
            Task::Cmd(task) => task.run(),
            Task::Ssh(task) => task.run(job),
            Task::Checkout(task) => task.run(job),
            Task::WebhookCheckout(task) => task.run(job),
            Task::Rsync(task) => task.run(job),
            Task::Callback(task) => task.run(job),
            Task::Expand(task) => task.run(job),
            Task::ImageBuild(task) => task.run(job),
            Task::ImageTag(task) => task.run(job),
            Task::ImagePush(task) => task.run(job),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Cmd(task) => write!(f, "cmd: {}", truncated(&task.command_text())),
            Task::Ssh(task) => write!(f, "ssh: {}", truncated(task.command())),
            Task::Checkout(task) => write!(f, "checkout: {}", task.repo()),
            Task::WebhookCheckout(_) => write!(f, "webhook checkout"),
            Task::Rsync(task) => write!(f, "rsync: {}", task.dest()),
            Task::Callback(_) => write!(f, "callback"),
            Task::Expand(_) => write!(f, "expand"),
            Task::ImageBuild(task) => write!(f, "docker build: {}", task.image_label()),
            Task::ImageTag(task) => write!(f, "docker tag: {}", task.tag_label()),
            Task::ImagePush(task) => write!(f, "docker push: {}", task.image_label()),
        }
    }
}

/// Resolves the connection a task actually uses: its own override first,
/// the job's default otherwise.
pub(crate) fn effective_connection(
    own: &Option<Arc<Connection>>,
    job: &Job,
) -> Option<Arc<Connection>> {
    own.clone().or_else(|| job.connection().cloned())
}

/// Runs a prepared command with inherited stdio, mapping spawn failures
/// and non-zero exits to execution errors.
pub(crate) fn run_command(label: &str, command: &mut Command) -> Result<(), ExecutionError> {
    debug!("exec: {}", label);
    let status = command.status().map_err(|source| ExecutionError::Spawn {
        command: label.to_string(),
        source,
    })?;
    if !status.success() {
        return Err(ExecutionError::CommandFailed {
            command: label.to_string(),
            status,
        });
    }
    Ok(())
}

fn truncated(text: &str) -> String {
    const MAX: usize = 50;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}...")
    }
}
