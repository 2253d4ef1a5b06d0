//! Task-table conversion
//!
//! Turns the task tables of a job definition into typed task variants.
//! The same converter handles tables produced at run time by `expand`
//! callbacks; those are front-inserted into the running job without
//! re-validation, so a bad dynamic task surfaces as an execution error.
//!
//! Callback and expand functions receive the job's props as a Lua table
//! and their mutations are merged back after the call. A callback may end
//! the pipeline cleanly with `job.stop(reason)`.

use std::sync::Arc;

use mlua::{Function, Lua, LuaSerdeExt, Table, Value};
use serde_json::Map;

use wharf_core::task::{
    CallbackTask, CheckoutTask, CmdTask, CommandLine, ExpandTask, HookFn, ImageBuildTask,
    ImagePushTask, ImageTagTask, RsyncTask, SshTask, WebhookCheckoutTask,
};
use wharf_core::{Connection, ExecutionError, Job, Task, TaskFlow};

use crate::error::LoadError;
use crate::sandbox::stop_reason;

/// Converts one task table into a task
pub fn parse_task(lua: &Lua, table: &Table) -> Result<Task, LoadError> {
    let task_type: String = table
        .get::<Option<String>>("type")
        .ok()
        .flatten()
        .ok_or_else(|| LoadError::Invalid("task is missing a 'type' field".into()))?;
    let connection = parse_task_connection(table)?;

    match task_type.as_str() {
        "cmd" => {
            let command = match table.get::<Value>("command").unwrap_or(Value::Nil) {
                Value::String(line) => CommandLine::Shell(line.to_str()?.to_string()),
                Value::Table(argv) => {
                    let mut args = Vec::new();
                    for entry in argv.sequence_values::<String>() {
                        args.push(entry.map_err(|_| {
                            LoadError::Invalid("'cmd' argv entries must be strings".into())
                        })?);
                    }
                    CommandLine::Argv(args)
                }
                _ => {
                    return Err(LoadError::Invalid(
                        "'cmd' task needs a 'command' string or argv table".into(),
                    ));
                }
            };
            Ok(Task::Cmd(CmdTask::new(command)))
        }
        "ssh" => {
            let command = require_str(table, "ssh", "command")?;
            Ok(Task::Ssh(SshTask::new(command, connection)))
        }
        "checkout" => {
            let repo = require_str(table, "checkout", "repo")?;
            let dest = require_str(table, "checkout", "dest")?;
            let branch = opt_str(table, "branch")?.unwrap_or_else(|| "master".to_string());
            Ok(Task::Checkout(CheckoutTask::new(
                repo,
                dest.into(),
                branch,
                connection,
            )))
        }
        "webhook_checkout" => {
            let dest = require_str(table, "webhook_checkout", "dest")?;
            let allow_branches = opt_str_list(table, "allow_branches")?;
            Ok(Task::WebhookCheckout(WebhookCheckoutTask::new(
                dest.into(),
                allow_branches,
                connection,
            )))
        }
        "rsync" => {
            let src = require_str(table, "rsync", "src")?;
            let dest = require_str(table, "rsync", "dest")?;
            let exclude = opt_str_list(table, "exclude")?.unwrap_or_default();
            let delete: bool = table.get("delete").unwrap_or(false);
            let flags = opt_str_list(table, "flags")?.unwrap_or_default();
            Ok(Task::Rsync(RsyncTask::new(
                src, dest, exclude, delete, flags, connection,
            )))
        }
        "callback" => {
            let func = require_function(table, "callback")?;
            Ok(Task::Callback(CallbackTask::new(wrap_callback(lua, func))))
        }
        "expand" => {
            let func = require_function(table, "expand")?;
            Ok(Task::Expand(ExpandTask::new(wrap_expand(lua, func))))
        }
        "docker_build" => Ok(Task::ImageBuild(ImageBuildTask::new(
            opt_str(table, "image")?,
            opt_str(table, "dir")?,
        ))),
        "docker_tag" => Ok(Task::ImageTag(ImageTagTask::new(
            opt_str(table, "image")?,
            opt_str(table, "tag")?,
        ))),
        "docker_push" => Ok(Task::ImagePush(ImagePushTask::new(opt_str(
            table, "image",
        )?))),
        other => Err(LoadError::Invalid(format!("unknown task type '{other}'"))),
    }
}

/// Parses a connection table (job-level default or per-task override)
pub(crate) fn parse_connection(table: &Table) -> Result<Connection, LoadError> {
    let host = require_str(table, "connection", "host")?;
    let username = require_str(table, "connection", "username")?;
    let port: Option<u16> = table
        .get::<Option<u16>>("port")
        .map_err(|_| LoadError::Invalid("connection 'port' must be an integer".into()))?;
    let key = opt_str(table, "key")?;
    let password = opt_str(table, "password")?;

    match (key, password) {
        (Some(key), None) => Ok(Connection::with_key(host, username, key, port)?),
        (None, Some(password)) => Ok(Connection::with_password(host, username, password, port)),
        (Some(_), Some(_)) => Err(LoadError::Invalid(
            "connection must set exactly one of 'key' or 'password'".into(),
        )),
        (None, None) => Err(LoadError::Invalid(
            "connection must set one of 'key' or 'password'".into(),
        )),
    }
}

fn parse_task_connection(table: &Table) -> Result<Option<Arc<Connection>>, LoadError> {
    match table.get::<Option<Table>>("connection") {
        Ok(Some(conn_table)) => Ok(Some(Arc::new(parse_connection(&conn_table)?))),
        Ok(None) => Ok(None),
        Err(_) => Err(LoadError::Invalid(
            "task 'connection' must be a table".into(),
        )),
    }
}

fn require_str(table: &Table, context: &str, field: &str) -> Result<String, LoadError> {
    match table.get::<Option<String>>(field) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(LoadError::Invalid(format!(
            "'{context}' is missing a '{field}' string"
        ))),
        Err(_) => Err(LoadError::Invalid(format!(
            "'{context}' field '{field}' must be a string"
        ))),
    }
}

fn opt_str(table: &Table, field: &str) -> Result<Option<String>, LoadError> {
    table
        .get::<Option<String>>(field)
        .map_err(|_| LoadError::Invalid(format!("field '{field}' must be a string")))
}

fn opt_str_list(table: &Table, field: &str) -> Result<Option<Vec<String>>, LoadError> {
    table
        .get::<Option<Vec<String>>>(field)
        .map_err(|_| LoadError::Invalid(format!("field '{field}' must be an array of strings")))
}

fn require_function(table: &Table, context: &str) -> Result<Function, LoadError> {
    table
        .get::<Option<Function>>("run")
        .ok()
        .flatten()
        .ok_or_else(|| LoadError::Invalid(format!("'{context}' task needs a 'run' function")))
}

fn script_err(err: mlua::Error) -> ExecutionError {
    ExecutionError::Script(err.to_string())
}

fn props_to_lua(lua: &Lua, job: &Job) -> Result<Value, ExecutionError> {
    lua.to_value(job.props()).map_err(script_err)
}

fn write_back_props(lua: &Lua, job: &mut Job, props: Value) -> Result<(), ExecutionError> {
    let updated: Map<String, serde_json::Value> = lua.from_value(props).map_err(script_err)?;
    *job.props_mut() = updated;
    Ok(())
}

/// Bridges a definition-script function into a callback hook
fn wrap_callback(lua: &Lua, func: Function) -> HookFn {
    let lua = lua.clone();
    Box::new(move |job: &mut Job| {
        let props = props_to_lua(&lua, job)?;
        if let Err(err) = func.call::<()>(props.clone()) {
            if let Some(reason) = stop_reason(&err) {
                return Ok(TaskFlow::Stop(reason));
            }
            return Err(script_err(err));
        }
        write_back_props(&lua, job, props)?;
        Ok(TaskFlow::Continue)
    })
}

/// Bridges a definition-script function into an expand hook: the returned
/// task tables are converted and handed to the run loop for front
/// insertion.
fn wrap_expand(lua: &Lua, func: Function) -> HookFn {
    let lua = lua.clone();
    Box::new(move |job: &mut Job| {
        let props = props_to_lua(&lua, job)?;
        let produced = match func.call::<Value>(props.clone()) {
            Ok(value) => value,
            Err(err) => {
                if let Some(reason) = stop_reason(&err) {
                    return Ok(TaskFlow::Stop(reason));
                }
                return Err(script_err(err));
            }
        };
        write_back_props(&lua, job, props)?;

        let tasks = match produced {
            Value::Nil => Vec::new(),
            Value::Table(list) => {
                let mut out = Vec::new();
                for entry in list.sequence_values::<Table>() {
                    let task_table = entry.map_err(script_err)?;
                    let task = parse_task(&lua, &task_table)
                        .map_err(|err| ExecutionError::Script(err.to_string()))?;
                    out.push(task);
                }
                out
            }
            _ => {
                return Err(ExecutionError::Script(
                    "expand callback must return a task array or nil".into(),
                ));
            }
        };
        Ok(TaskFlow::Insert(tasks))
    })
}
