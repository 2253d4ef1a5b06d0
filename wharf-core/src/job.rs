//! Job: the execution context for one triggered pipeline run
//!
//! A job is an ordered queue of tasks plus a shared property bag. Tasks are
//! validated when they are appended (so a misconfigured job fails at
//! definition-load time, before any side effect) and consumed FIFO by the
//! run loop. A running task may prepend new tasks, which execute immediately
//! next, ahead of everything previously queued.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::connection::Connection;
use crate::error::{ExecutionError, ValidationError};
use crate::task::{Task, TaskFlow};

/// Terminal state of a job run
///
/// A stop requested by a task is a policy exit, not a fault; only `Failed`
/// marks the run as broken.
#[derive(Debug)]
pub enum JobOutcome {
    /// The queue drained with every task succeeding
    Completed,
    /// A task requested an early stop, skipping the rest of the queue
    Stopped(String),
    /// A task faulted; no further tasks were executed
    Failed(ExecutionError),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

/// One pipeline run: a FIFO task queue and the shared mutable `props` bag
///
/// `props` is the only shared-state channel between tasks: later tasks
/// observe earlier tasks' writes. Reserved keys are `"payload"` (the
/// decoded webhook body), `"auth"` (the credential pair that triggered the
/// run, or null) and the image-task conventions `"docker_imagename"`,
/// `"docker_codedir"`, `"docker_tag"`. The default connection lives in its
/// own typed slot rather than in the map.
pub struct Job {
    tasks: VecDeque<Task>,
    default_connection: Option<Arc<Connection>>,
    props: Map<String, Value>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            default_connection: None,
            props: Map::new(),
        }
    }

    /// Sets the implicit connection used by tasks without an override
    ///
    /// Must be called before tasks that rely on implicit resolution are
    /// added, since validation happens at add-time.
    pub fn default_connection(&mut self, connection: Arc<Connection>) {
        self.default_connection = Some(connection);
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.default_connection.as_ref()
    }

    /// Validates the task against the current job state and appends it
    ///
    /// On validation failure the queue is left unchanged.
    pub fn add_task(&mut self, task: Task) -> Result<(), ValidationError> {
        task.validate(self)?;
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn tasks(&self) -> &VecDeque<Task> {
        &self.tasks
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.props
    }

    /// String-typed property lookup, used by tasks with prop fallbacks
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    /// Merges `params` into `props` (params win on key collision), then
    /// drains the task queue front-to-back.
    ///
    /// Tasks a running task inserts via `TaskFlow::Insert` land at the
    /// front of the queue in their given order, so the first inserted runs
    /// next. The loop ends at the first stop or fault; it is not
    /// re-entrant and there is no resume or retry.
    pub fn run(&mut self, params: Map<String, Value>) -> JobOutcome {
        self.props.extend(params);

        while let Some(mut task) = self.tasks.pop_front() {
            info!("task: {}", task);
            match task.run(self) {
                Ok(TaskFlow::Continue) => {}
                Ok(TaskFlow::Insert(new_tasks)) => {
                    debug!("inserting {} task(s) at the front of the queue", new_tasks.len());
                    for (idx, inserted) in new_tasks.into_iter().enumerate() {
                        self.tasks.insert(idx, inserted);
                    }
                }
                Ok(TaskFlow::Stop(reason)) => {
                    info!("job stopped: {}", reason);
                    return JobOutcome::Stopped(reason);
                }
                Err(err) => {
                    error!("task failed: {}", err);
                    return JobOutcome::Failed(err);
                }
            }
        }

        JobOutcome::Completed
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
