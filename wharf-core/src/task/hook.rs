//! Callback-driven tasks
//!
//! These carry an opaque hook invoked with the running job. The loader
//! wraps job-definition script functions into hooks; tests use plain
//! closures. `Callback` is for side effects on props; `Expand` is expected
//! to return `TaskFlow::Insert`, scheduling its produced tasks immediately
//! next. Tasks inserted this way are not re-validated.

use crate::error::ExecutionError;
use crate::job::Job;
use crate::task::TaskFlow;

/// A hook invoked with the running job
pub type HookFn = Box<dyn FnMut(&mut Job) -> Result<TaskFlow, ExecutionError> + Send>;

/// Invokes a callback with the job, typically to read or enrich props
pub struct CallbackTask {
    hook: HookFn,
}

impl CallbackTask {
    pub fn new(hook: HookFn) -> Self {
        Self { hook }
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        (self.hook)(job)
    }
}

/// Invokes a callback that produces tasks to run next
pub struct ExpandTask {
    hook: HookFn,
}

impl ExpandTask {
    pub fn new(hook: HookFn) -> Self {
        Self { hook }
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        (self.hook)(job)
    }
}
