//! Repository checkout tasks
//!
//! Both variants drive the `git` CLI: init the destination, add the
//! remote, fetch with prompts disabled, and check out the requested
//! branch. The webhook variant derives repository and branch from the
//! trigger payload instead of explicit configuration.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::connection::{Connection, ConnectionAuth};
use crate::error::{ExecutionError, ValidationError};
use crate::job::Job;
use crate::task::{TaskFlow, effective_connection, run_command};

/// Checks out an explicitly configured repository
pub struct CheckoutTask {
    repo: String,
    dest: PathBuf,
    branch: String,
    connection: Option<Arc<Connection>>,
}

impl CheckoutTask {
    pub fn new(
        repo: String,
        dest: PathBuf,
        branch: String,
        connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            repo,
            dest,
            branch,
            connection,
        }
    }

    pub(crate) fn repo(&self) -> &str {
        &self.repo
    }

    pub(crate) fn validate(&self, job: &Job) -> Result<(), ValidationError> {
        if self.repo.starts_with("http") {
            return Ok(());
        }
        if self.repo.starts_with("ssh") {
            return effective_connection(&self.connection, job)
                .map(|_| ())
                .ok_or(ValidationError::NoConnection);
        }
        Err(ValidationError::UnsupportedRepoUrl(self.repo.clone()))
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let conn = effective_connection(&self.connection, job);
        checkout(&self.repo, &self.dest, &self.branch, conn.as_deref())?;
        Ok(TaskFlow::Continue)
    }
}

/// Checks out whatever repository and branch the webhook payload references
///
/// Key-based connections fetch over `repository.ssh_url`; password-based
/// connections embed the credentials into `repository.clone_url`. An
/// optional branch allow-list turns a non-matching push into a clean stop
/// rather than a failure.
pub struct WebhookCheckoutTask {
    dest: PathBuf,
    allow_branches: Option<Vec<String>>,
    connection: Option<Arc<Connection>>,
}

impl WebhookCheckoutTask {
    pub fn new(
        dest: PathBuf,
        allow_branches: Option<Vec<String>>,
        connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            dest,
            allow_branches,
            connection,
        }
    }

    pub(crate) fn validate(&self, job: &Job) -> Result<(), ValidationError> {
        effective_connection(&self.connection, job)
            .map(|_| ())
            .ok_or(ValidationError::NoConnection)
    }

    pub(crate) fn run(&mut self, job: &mut Job) -> Result<TaskFlow, ExecutionError> {
        let conn = effective_connection(&self.connection, job).ok_or(ExecutionError::NoConnection)?;

        let payload = job
            .props()
            .get("payload")
            .ok_or_else(|| ExecutionError::Payload("trigger carried no payload".into()))?;
        let repository = payload
            .get("repository")
            .ok_or_else(|| ExecutionError::Payload("payload has no 'repository'".into()))?;

        let repo = match conn.auth() {
            ConnectionAuth::Key(_) => payload_str(repository, "ssh_url")?.to_string(),
            ConnectionAuth::Password(password) => {
                let clone_url = payload_str(repository, "clone_url")?;
                clone_url.replacen(
                    "://",
                    &format!("://{}:{}@", conn.username(), password),
                    1,
                )
            }
        };

        let git_ref = payload
            .get("ref")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutionError::Payload("payload has no 'ref'".into()))?;
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref).to_string();

        if let Some(allowed) = &self.allow_branches {
            if !allowed.iter().any(|b| *b == branch) {
                return Ok(TaskFlow::Stop(format!(
                    "branch '{branch}' is not in the allow list"
                )));
            }
        }

        info!("checking out {} ({})", repo, branch);
        checkout(&repo, &self.dest, &branch, Some(&conn))?;
        Ok(TaskFlow::Continue)
    }
}

fn payload_str<'a>(repository: &'a Value, field: &str) -> Result<&'a str, ExecutionError> {
    repository
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutionError::Payload(format!("payload has no 'repository.{field}'")))
}

/// Fetches `repo` into `dest` and checks out `branch`
fn checkout(
    repo: &str,
    dest: &std::path::Path,
    branch: &str,
    conn: Option<&Connection>,
) -> Result<(), ExecutionError> {
    fs::create_dir_all(dest)?;

    let mut init = Command::new("git");
    init.arg("init").arg(dest);
    run_command("git init", &mut init)?;

    let mut remote = Command::new("git");
    remote.arg("-C").arg(dest).args(["remote", "add", "origin", repo]);
    run_command("git remote add", &mut remote)?;

    let mut fetch = Command::new("git");
    fetch.arg("-C").arg(dest).args(["fetch", "origin"]);
    fetch.env("GIT_TERMINAL_PROMPT", "0");
    if repo.starts_with("ssh") {
        if let Some(key) = conn.and_then(Connection::key) {
            fetch.env(
                "GIT_SSH_COMMAND",
                format!("ssh -i {} -o StrictHostKeyChecking=no", key.display()),
            );
        }
    }
    run_command("git fetch", &mut fetch)?;

    let mut switch = Command::new("git");
    switch.arg("-C").arg(dest).args(["checkout", branch]);
    run_command("git checkout", &mut switch)?;

    // Show what was checked out, like a CI log would
    let mut log = Command::new("git");
    log.arg("-C").arg(dest).args(["log", "--oneline", "-10"]);
    run_command("git log", &mut log)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_password_connection() -> Job {
        let mut job = Job::new();
        job.default_connection(Arc::new(Connection::with_password(
            "git.example.com",
            "ci",
            "secret",
            None,
        )));
        job
    }

    #[test]
    fn test_validate_http_repo_needs_no_connection() {
        let job = Job::new();
        let task = CheckoutTask::new(
            "https://example.com/repo.git".into(),
            "code".into(),
            "main".into(),
            None,
        );
        assert!(task.validate(&job).is_ok());
    }

    #[test]
    fn test_validate_ssh_repo_requires_connection() {
        let job = Job::new();
        let task = CheckoutTask::new(
            "ssh://git@example.com/repo.git".into(),
            "code".into(),
            "main".into(),
            None,
        );
        assert!(matches!(
            task.validate(&job),
            Err(ValidationError::NoConnection)
        ));
        assert!(task.validate(&job_with_password_connection()).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_scheme() {
        let job = Job::new();
        let task = CheckoutTask::new(
            "ftp://example.com/repo".into(),
            "code".into(),
            "main".into(),
            None,
        );
        assert!(matches!(
            task.validate(&job),
            Err(ValidationError::UnsupportedRepoUrl(_))
        ));
    }

    #[test]
    fn test_webhook_checkout_stops_on_disallowed_branch() {
        let mut job = job_with_password_connection();
        job.props_mut().insert(
            "payload".into(),
            serde_json::json!({
                "repository": {"clone_url": "https://example.com/repo.git"},
                "ref": "refs/heads/feature"
            }),
        );

        let mut task =
            WebhookCheckoutTask::new("code".into(), Some(vec!["master".into()]), None);
        match task.run(&mut job) {
            Ok(TaskFlow::Stop(reason)) => assert!(reason.contains("feature")),
            _ => panic!("expected a clean stop"),
        }
    }

    #[test]
    fn test_webhook_checkout_requires_payload() {
        let mut job = job_with_password_connection();
        let mut task = WebhookCheckoutTask::new("code".into(), None, None);
        assert!(matches!(
            task.run(&mut job),
            Err(ExecutionError::Payload(_))
        ));
    }
}
