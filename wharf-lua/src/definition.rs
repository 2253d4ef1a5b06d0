//! Job definition loading
//!
//! A job definition is a Lua chunk that returns a table:
//!
//! ```lua
//! return {
//!     connection = { host = "deploy", username = "ci", key = "/etc/wharf/id_rsa" },
//!     auth = { { "hook", "secret" } },
//!     tasks = {
//!         { type = "webhook_checkout", dest = "code", allow_branches = { "master" } },
//!         { type = "cmd", command = "make dist" },
//!         { type = "rsync", src = "code/dist/", dest = "deploy:/srv/app", delete = true },
//!     },
//! }
//! ```
//!
//! Loading evaluates the chunk in the sandbox and builds the job by adding
//! each task in order, which triggers add-time validation — so a
//! misconfigured definition is rejected before any process is spawned.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use mlua::{Lua, Table, Value};
use serde_json::Map;

use wharf_core::{Job, JobOutcome};

use crate::error::LoadError;
use crate::sandbox::create_sandbox;
use crate::tasks::{parse_connection, parse_task};

/// A loaded, validated job definition, ready to run once
pub struct JobDefinition {
    // Callback tasks hold functions tied to this VM; it lives as long as
    // the definition does.
    #[allow(dead_code)]
    lua: Lua,
    job: Job,
    auth: Option<HashSet<(String, String)>>,
}

impl JobDefinition {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// The accepted-credential set, if the definition declares one
    pub fn auth(&self) -> Option<&HashSet<(String, String)>> {
        self.auth.as_ref()
    }

    /// Whether triggering this job requires credentials
    pub fn requires_auth(&self) -> bool {
        self.auth.as_ref().is_some_and(|set| !set.is_empty())
    }

    /// Whether the supplied credential may trigger this job
    ///
    /// Jobs without an auth declaration accept anything, including no
    /// credential at all.
    pub fn authorizes(&self, credential: Option<&(String, String)>) -> bool {
        match &self.auth {
            Some(accepted) if !accepted.is_empty() => {
                credential.is_some_and(|pair| accepted.contains(pair))
            }
            _ => true,
        }
    }

    /// Runs the job to a terminal outcome
    pub fn run(&mut self, params: Map<String, serde_json::Value>) -> JobOutcome {
        self.job.run(params)
    }
}

/// Loads and parses the definition at `path`
pub fn load_definition(path: &Path) -> Result<JobDefinition, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_definition(&source)
}

/// Parses a definition from Lua source
pub fn parse_definition(source: &str) -> Result<JobDefinition, LoadError> {
    let lua = create_sandbox()?;

    let table = match lua.load(source).eval::<Value>() {
        Ok(Value::Table(table)) => table,
        Ok(_) => {
            return Err(LoadError::Invalid(
                "job definition must return a table".into(),
            ));
        }
        Err(err) => return Err(LoadError::Eval(err)),
    };

    let mut job = Job::new();

    match table.get::<Option<Table>>("connection") {
        Ok(Some(conn_table)) => {
            job.default_connection(Arc::new(parse_connection(&conn_table)?));
        }
        Ok(None) => {}
        Err(_) => return Err(LoadError::Invalid("'connection' must be a table".into())),
    }

    let auth = parse_auth(&table)?;

    let tasks_table = table
        .get::<Option<Table>>("tasks")
        .map_err(|_| LoadError::Invalid("'tasks' must be an array of task tables".into()))?
        .ok_or_else(|| LoadError::Invalid("job definition must have a 'tasks' array".into()))?;

    for entry in tasks_table.sequence_values::<Table>() {
        let task_table =
            entry.map_err(|_| LoadError::Invalid("'tasks' entries must be tables".into()))?;
        let task = parse_task(&lua, &task_table)?;
        job.add_task(task)?;
    }

    Ok(JobDefinition { lua, job, auth })
}

fn parse_auth(table: &Table) -> Result<Option<HashSet<(String, String)>>, LoadError> {
    match table.get::<Value>("auth").unwrap_or(Value::Nil) {
        Value::Nil => Ok(None),
        Value::Table(list) => {
            let mut accepted = HashSet::new();
            for entry in list.sequence_values::<Vec<String>>() {
                let pair = entry.map_err(|_| {
                    LoadError::Invalid("'auth' entries must be {user, password} pairs".into())
                })?;
                let mut fields = pair.into_iter();
                match (fields.next(), fields.next(), fields.next()) {
                    (Some(user), Some(password), None) => {
                        accepted.insert((user, password));
                    }
                    _ => {
                        return Err(LoadError::Invalid(
                            "'auth' entries must be {user, password} pairs".into(),
                        ));
                    }
                }
            }
            Ok(Some(accepted))
        }
        _ => Err(LoadError::Invalid(
            "'auth' must be an array of {user, password} pairs".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wharf_core::ValidationError;

    fn params(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_minimal_definition() {
        let definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "cmd", command = "make dist" },
                }
            }
        "#,
        )
        .unwrap();

        assert_eq!(definition.job().tasks().len(), 1);
        assert_eq!(definition.job().tasks()[0].to_string(), "cmd: make dist");
        assert!(definition.auth().is_none());
        assert!(!definition.requires_auth());
    }

    #[test]
    fn test_parse_connection_and_auth() {
        let definition = parse_definition(
            r#"
            return {
                connection = { host = "deploy", username = "ci", password = "pw", port = 2222 },
                auth = { { "hook", "secret" }, { "other", "pw2" } },
                tasks = {
                    { type = "ssh", command = "systemctl restart app" },
                }
            }
        "#,
        )
        .unwrap();

        let conn = definition.job().connection().unwrap();
        assert_eq!(conn.host(), "deploy");
        assert_eq!(conn.port(), 2222);

        assert!(definition.requires_auth());
        assert!(definition.authorizes(Some(&("hook".into(), "secret".into()))));
        assert!(!definition.authorizes(Some(&("hook".into(), "wrong".into()))));
        assert!(!definition.authorizes(None));
    }

    #[test]
    fn test_definition_without_auth_authorizes_anything() {
        let definition = parse_definition(
            r#"return { tasks = { { type = "cmd", command = "true" } } }"#,
        )
        .unwrap();

        assert!(definition.authorizes(None));
        assert!(definition.authorizes(Some(&("any".into(), "thing".into()))));
    }

    #[test]
    fn test_task_order_preserved() {
        let definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "cmd", command = "first" },
                    { type = "cmd", command = "second" },
                    { type = "cmd", command = "third" },
                }
            }
        "#,
        )
        .unwrap();

        let described: Vec<String> = definition
            .job()
            .tasks()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(described, vec!["cmd: first", "cmd: second", "cmd: third"]);
    }

    #[test]
    fn test_definition_must_return_table() {
        let result = parse_definition(r#"return "not a table""#);
        assert!(matches!(result, Err(LoadError::Invalid(_))));
    }

    #[test]
    fn test_invalid_lua_is_an_eval_error() {
        let result = parse_definition("this is not valid lua!!!");
        assert!(matches!(result, Err(LoadError::Eval(_))));
    }

    #[test]
    fn test_missing_tasks_array() {
        let result = parse_definition(r#"return { connection = nil }"#);
        assert!(matches!(result, Err(LoadError::Invalid(_))));
    }

    #[test]
    fn test_unknown_task_type() {
        let result = parse_definition(
            r#"return { tasks = { { type = "teleport" } } }"#,
        );
        match result {
            Err(LoadError::Invalid(msg)) => assert!(msg.contains("teleport")),
            other => panic!("expected Invalid, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_ssh_without_connection_fails_validation_at_load() {
        let result = parse_definition(
            r#"return { tasks = { { type = "ssh", command = "uptime" } } }"#,
        );
        assert!(matches!(
            result,
            Err(LoadError::Validation(ValidationError::NoConnection))
        ));
    }

    #[test]
    fn test_load_definition_not_found() {
        let result = load_definition(Path::new("/nonexistent/job.lua"));
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_callback_reads_payload_and_writes_props() {
        let mut definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "callback", run = function(props)
                        local name = props.payload.repository.name
                        if string.sub(name, 1, 7) == "docker-" then
                            name = string.sub(name, 8)
                        end
                        props.docker_imagename = name
                    end },
                }
            }
        "#,
        )
        .unwrap();

        let outcome = definition.run(params(json!({
            "payload": { "repository": { "name": "docker-nginx" } }
        })));

        assert!(matches!(outcome, JobOutcome::Completed));
        assert_eq!(
            definition.job().props()["docker_imagename"],
            json!("nginx")
        );
    }

    #[test]
    fn test_expand_inserted_tasks_run_first_in_order() {
        let mut definition = parse_definition(
            r#"
            local function mark(name)
                return { type = "callback", run = function(props)
                    props.order = props.order or {}
                    table.insert(props.order, name)
                end }
            end

            return {
                tasks = {
                    { type = "expand", run = function(props)
                        return { mark("a"), mark("b") }
                    end },
                    mark("c"),
                }
            }
        "#,
        )
        .unwrap();

        let outcome = definition.run(Map::new());

        assert!(matches!(outcome, JobOutcome::Completed));
        assert_eq!(
            definition.job().props()["order"],
            json!(["a", "b", "c"])
        );
    }

    #[test]
    fn test_job_stop_ends_run_cleanly() {
        let mut definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "callback", run = function(props)
                        job.stop("nothing to do")
                    end },
                    { type = "callback", run = function(props)
                        props.ran_after_stop = true
                    end },
                }
            }
        "#,
        )
        .unwrap();

        let outcome = definition.run(Map::new());

        match outcome {
            JobOutcome::Stopped(reason) => assert_eq!(reason, "nothing to do"),
            other => panic!("expected Stopped, got {:?}", other),
        }
        assert!(definition.job().props().get("ran_after_stop").is_none());
    }

    #[test]
    fn test_callback_error_fails_job() {
        let mut definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "callback", run = function(props)
                        error("boom")
                    end },
                }
            }
        "#,
        )
        .unwrap();

        let outcome = definition.run(Map::new());
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_dynamically_inserted_task_skips_validation() {
        // An ssh task with no connection anywhere would be rejected at
        // load time; produced by expand it parses fine and fails only
        // when it runs.
        let mut definition = parse_definition(
            r#"
            return {
                tasks = {
                    { type = "expand", run = function(props)
                        return { { type = "ssh", command = "uptime" } }
                    end },
                }
            }
        "#,
        )
        .unwrap();

        let outcome = definition.run(Map::new());
        assert!(outcome.is_failure());
    }
}
