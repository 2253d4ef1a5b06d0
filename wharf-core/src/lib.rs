//! Wharf Core
//!
//! The job execution engine for the wharf automation runner.
//!
//! This crate contains:
//! - `Job`: an ordered, mutable task queue plus a shared property bag,
//!   acting as the execution context for one triggered pipeline run
//! - `Task`: the closed set of task variants, each implementing the
//!   two-phase validate/run contract
//! - `Connection`: the remote-execution credential bundle shared by tasks
//! - Control-flow and error types for the run loop

pub mod connection;
pub mod error;
pub mod job;
pub mod task;

pub use connection::{Connection, ConnectionAuth};
pub use error::{ExecutionError, ValidationError};
pub use job::{Job, JobOutcome};
pub use task::{HookFn, Task, TaskFlow};
