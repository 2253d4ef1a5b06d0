//! Trigger intake and the worker pool
//!
//! `Dispatcher::enqueue` turns an inbound trigger into a queued
//! `(job_name, params)` pair: it loads the named definition (rejecting the
//! trigger if the artifact is missing, invalid, or fails task validation),
//! attaches the decoded JSON body and the resolved credential to the
//! parameters, and enforces the definition's accepted-credential set.
//!
//! A single dispatch loop drains the queue in FIFO order under a
//! fixed-size semaphore, so at most `workers` job processes run at once;
//! the next trigger starts only when a slot frees. A failing job is
//! logged and contained — it never affects other queued or running jobs,
//! and nothing is retried.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info};

use wharf_lua::{LoadError, load_definition};

use crate::auth::parse_basic;
use crate::executor::{JobExecutor, RunError};

/// A trigger accepted by the dispatcher, waiting for a worker slot
#[derive(Debug)]
pub struct QueuedTrigger {
    pub job_name: String,
    pub job_file: PathBuf,
    pub params: Map<String, Value>,
}

/// Supplied credentials are absent or not in the job's accepted set
#[derive(Debug, Error)]
#[error("missing or rejected credentials for job '{job}'")]
pub struct AuthError {
    pub job: String,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("invalid job name '{0}'")]
    InvalidName(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("dispatcher is no longer accepting triggers")]
    Closed,
}

/// Accepts triggers and feeds the worker pool
pub struct Dispatcher {
    jobs_dir: PathBuf,
    tx: mpsc::UnboundedSender<QueuedTrigger>,
}

impl Dispatcher {
    pub fn new(jobs_dir: PathBuf, tx: mpsc::UnboundedSender<QueuedTrigger>) -> Self {
        Self { jobs_dir, tx }
    }

    /// Validates a trigger and places it on the work queue
    ///
    /// Acceptance is fire-and-forget: the eventual job outcome never
    /// reaches the caller.
    pub fn enqueue(
        &self,
        name: &str,
        mut params: Map<String, Value>,
        auth_header: Option<&str>,
        body: &[u8],
    ) -> Result<(), EnqueueError> {
        let job_file = self.job_file(name)?;
        let definition = load_definition(&job_file)?;

        // Only a JSON body becomes the payload; anything else is dropped
        if !body.is_empty() {
            if let Ok(payload) = serde_json::from_slice::<Value>(body) {
                params.insert("payload".into(), payload);
            }
        }

        let credential = auth_header.and_then(parse_basic);
        if !definition.authorizes(credential.as_ref()) {
            return Err(AuthError {
                job: name.to_string(),
            }
            .into());
        }

        // Tasks can inspect who triggered the run
        params.insert(
            "auth".into(),
            match &credential {
                Some((user, password)) => serde_json::json!([user, password]),
                None => Value::Null,
            },
        );

        info!("queueing job '{}'", name);
        self.tx
            .send(QueuedTrigger {
                job_name: name.to_string(),
                job_file,
                params,
            })
            .map_err(|_| EnqueueError::Closed)
    }

    /// Maps a job name to its definition file, rejecting names that could
    /// escape the jobs directory.
    fn job_file(&self, name: &str) -> Result<PathBuf, EnqueueError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EnqueueError::InvalidName(name.to_string()));
        }
        Ok(self.jobs_dir.join(format!("{name}.lua")))
    }
}

/// Drains the trigger queue, running each job under a pool slot
pub async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<QueuedTrigger>,
    workers: usize,
    executor: Arc<dyn JobExecutor>,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    info!("dispatcher running with {} worker slot(s)", workers);

    while let Some(trigger) = rx.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            // Slot is held for the lifetime of the job process
            let _permit = permit;
            info!("starting job '{}'", trigger.job_name);
            match executor.execute(&trigger.job_file, &trigger.params).await {
                Ok(()) => info!("job '{}' finished", trigger.job_name),
                Err(err @ RunError::Spawn(_)) => {
                    error!("could not launch job '{}': {}", trigger.job_name, err);
                }
                Err(RunError::Failed(status)) => {
                    error!("job '{}' failed ({})", trigger.job_name, status);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const OPEN_JOB: &str = r#"return { tasks = { { type = "cmd", command = "true" } } }"#;
    const PROTECTED_JOB: &str = r#"
        return {
            auth = { { "u1", "p1" }, { "u2", "p2" } },
            tasks = { { type = "cmd", command = "true" } },
        }
    "#;

    fn jobs_dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, source) in files {
            std::fs::write(dir.path().join(name), source).unwrap();
        }
        dir
    }

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    #[test]
    fn test_auth_property_on_protected_job() {
        let dir = jobs_dir_with(&[("guarded.lua", PROTECTED_JOB)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(dir.path().to_path_buf(), tx);

        // member credential accepted
        let accepted = basic("u1", "p1");
        dispatcher
            .enqueue("guarded", Map::new(), Some(accepted.as_str()), b"")
            .unwrap();

        // wrong password rejected
        let rejected = basic("u1", "wrong");
        assert!(matches!(
            dispatcher.enqueue("guarded", Map::new(), Some(rejected.as_str()), b""),
            Err(EnqueueError::Auth(_))
        ));

        // absent credential rejected
        assert!(matches!(
            dispatcher.enqueue("guarded", Map::new(), None, b""),
            Err(EnqueueError::Auth(_))
        ));

        let trigger = rx.try_recv().unwrap();
        assert_eq!(trigger.params["auth"], serde_json::json!(["u1", "p1"]));
        assert!(rx.try_recv().is_err(), "rejected triggers must not queue");
    }

    #[test]
    fn test_open_job_accepts_any_credentials() {
        let dir = jobs_dir_with(&[("open.lua", OPEN_JOB)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(dir.path().to_path_buf(), tx);

        dispatcher.enqueue("open", Map::new(), None, b"").unwrap();
        let credential = basic("who", "ever");
        dispatcher
            .enqueue("open", Map::new(), Some(credential.as_str()), b"")
            .unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.params["auth"], Value::Null);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.params["auth"], serde_json::json!(["who", "ever"]));
    }

    #[test]
    fn test_json_body_becomes_payload() {
        let dir = jobs_dir_with(&[("open.lua", OPEN_JOB)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(dir.path().to_path_buf(), tx);

        dispatcher
            .enqueue(
                "open",
                Map::new(),
                None,
                br#"{"repository": {"name": "docker-nginx"}}"#,
            )
            .unwrap();
        let trigger = rx.try_recv().unwrap();
        assert_eq!(
            trigger.params["payload"]["repository"]["name"],
            serde_json::json!("docker-nginx")
        );

        // non-JSON bodies leave payload unset
        dispatcher
            .enqueue("open", Map::new(), None, b"plain text")
            .unwrap();
        let trigger = rx.try_recv().unwrap();
        assert!(trigger.params.get("payload").is_none());
    }

    #[test]
    fn test_unknown_and_invalid_names_are_rejected() {
        let dir = jobs_dir_with(&[]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(dir.path().to_path_buf(), tx);

        assert!(matches!(
            dispatcher.enqueue("missing", Map::new(), None, b""),
            Err(EnqueueError::Load(LoadError::NotFound(_)))
        ));
        assert!(matches!(
            dispatcher.enqueue("../escape", Map::new(), None, b""),
            Err(EnqueueError::InvalidName(_))
        ));
        assert!(matches!(
            dispatcher.enqueue("", Map::new(), None, b""),
            Err(EnqueueError::InvalidName(_))
        ));
    }

    #[test]
    fn test_triggers_queue_fifo() {
        let dir = jobs_dir_with(&[("a.lua", OPEN_JOB), ("b.lua", OPEN_JOB)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(dir.path().to_path_buf(), tx);

        dispatcher.enqueue("a", Map::new(), None, b"").unwrap();
        dispatcher.enqueue("b", Map::new(), None, b"").unwrap();

        assert_eq!(rx.try_recv().unwrap().job_name, "a");
        assert_eq!(rx.try_recv().unwrap().job_name, "b");
    }

    struct GatedExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl JobExecutor for GatedExecutor {
        async fn execute(
            &self,
            _job_file: &Path,
            _params: &Map<String, Value>,
        ) -> Result<(), RunError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_worker_count() {
        let executor = Arc::new(GatedExecutor {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..3 {
            tx.send(QueuedTrigger {
                job_name: format!("job{i}"),
                job_file: PathBuf::from("job.lua"),
                params: Map::new(),
            })
            .unwrap();
        }
        drop(tx);

        // Queue is closed, so the loop returns once every trigger has a slot
        run_dispatcher(rx, 2, executor.clone()).await;

        // The last spawned job may still be running when the loop returns
        for _ in 0..100 {
            if executor.done.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(executor.done.load(Ordering::SeqCst), 3);
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    }
}
