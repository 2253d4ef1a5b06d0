//! Remote command execution over ssh
//!
//! Thin wrapper around the `ssh` CLI. Key-based connections pass the
//! identity file and run in batch mode; password-based connections go
//! through `sshpass` with the password delivered via the environment.

use std::process::Command;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionAuth};
use crate::error::{ExecutionError, ValidationError};
use crate::job::Job;
use crate::task::{TaskFlow, effective_connection, run_command};

/// Executes a command on a remote host over the task's effective connection
pub struct SshTask {
    command: String,
    connection: Option<Arc<Connection>>,
}

impl SshTask {
    pub fn new(command: String, connection: Option<Arc<Connection>>) -> Self {
        Self {
            command,
            connection,
        }
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn validate(&self, job: &Job) -> Result<(), ValidationError> {
        if self.command.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        effective_connection(&self.connection, job)
            .map(|_| ())
            .ok_or(ValidationError::NoConnection)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let conn = effective_connection(&self.connection, job).ok_or(ExecutionError::NoConnection)?;
        let mut command = ssh_command(&conn);
        command.arg(conn.destination()).arg(&self.command);
        run_command(&format!("ssh {}", conn.destination()), &mut command)?;
        Ok(TaskFlow::Continue)
    }
}

/// Builds the ssh invocation for a connection, without the destination or
/// the remote command.
fn ssh_command(conn: &Connection) -> Command {
    let mut command = match conn.auth() {
        ConnectionAuth::Key(key) => {
            let mut c = Command::new("ssh");
            c.arg("-i").arg(key);
            c.args(["-o", "BatchMode=yes"]);
            c
        }
        ConnectionAuth::Password(password) => {
            let mut c = Command::new("sshpass");
            c.arg("-e").env("SSHPASS", password);
            c.arg("ssh");
            c
        }
    };
    if conn.port() != 22 {
        command.arg("-p").arg(conn.port().to_string());
    }
    command.args(["-o", "StrictHostKeyChecking=no"]);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_some_connection() {
        let job = Job::new();
        let task = SshTask::new("uptime".into(), None);
        assert!(matches!(
            task.validate(&job),
            Err(ValidationError::NoConnection)
        ));
    }

    #[test]
    fn test_validate_accepts_job_default_connection() {
        let mut job = Job::new();
        job.default_connection(Arc::new(Connection::with_password(
            "host", "ci", "secret", None,
        )));
        let task = SshTask::new("uptime".into(), None);
        assert!(task.validate(&job).is_ok());
    }

    #[test]
    fn test_validate_prefers_task_override() {
        let job = Job::new();
        let own = Arc::new(Connection::with_password("host", "ci", "secret", None));
        let task = SshTask::new("uptime".into(), Some(own));
        assert!(task.validate(&job).is_ok());
    }
}
