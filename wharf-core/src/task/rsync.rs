//! File tree synchronization to a remote host

use std::process::Command;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::{ExecutionError, ValidationError};
use crate::job::Job;
use crate::task::{TaskFlow, effective_connection, run_command};

/// Rsyncs a local file tree to a remote destination
///
/// Key-based connections are passed to rsync as its ssh transport; other
/// flags mirror the rsync CLI directly.
pub struct RsyncTask {
    src: String,
    dest: String,
    exclude: Vec<String>,
    delete: bool,
    flags: Vec<String>,
    connection: Option<Arc<Connection>>,
}

impl RsyncTask {
    pub fn new(
        src: String,
        dest: String,
        exclude: Vec<String>,
        delete: bool,
        flags: Vec<String>,
        connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            src,
            dest,
            exclude,
            delete,
            flags,
            connection,
        }
    }

    pub(crate) fn dest(&self) -> &str {
        &self.dest
    }

    pub(crate) fn validate(&self, job: &Job) -> Result<(), ValidationError> {
        if self.src.is_empty() {
            return Err(ValidationError::MissingField("src"));
        }
        if self.dest.is_empty() {
            return Err(ValidationError::MissingField("dest"));
        }
        effective_connection(&self.connection, job)
            .map(|_| ())
            .ok_or(ValidationError::NoConnection)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let conn = effective_connection(&self.connection, job).ok_or(ExecutionError::NoConnection)?;

        let mut command = Command::new("rsync");
        command.arg("-avzr");
        if let Some(key) = conn.key() {
            command.arg("-e").arg(format!(
                "ssh -i '{}' -o StrictHostKeyChecking=no",
                key.display()
            ));
        }
        for item in &self.exclude {
            command.arg(format!("--exclude={item}"));
        }
        if self.delete {
            command.arg("--delete");
        }
        command.args(&self.flags);
        command.arg(&self.src).arg(&self.dest);

        run_command(&format!("rsync {} {}", self.src, self.dest), &mut command)?;
        Ok(TaskFlow::Continue)
    }
}
