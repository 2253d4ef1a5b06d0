//! Lua sandbox creation
//!
//! Job definitions run arbitrary top-level code at load time and callback
//! code at run time, so the sandbox is restricted to basic Lua
//! functionality (tables, strings, math, coroutines). File system access,
//! network access, and loading external code are not available; anything a
//! job needs to do to the outside world goes through a task.
//!
//! Two modules are always registered:
//! - `log` (debug/info/warn/error) forwards script messages into the
//!   runner's log output
//! - `job.stop(reason)` lets a callback terminate the pipeline cleanly

use mlua::{Lua, Result as LuaResult, StdLib};

/// Marker carried by the error `job.stop` raises, so the callback bridge
/// can tell a requested stop from a genuine script fault.
pub(crate) const STOP_PREFIX: &str = "__wharf_stop__:";

/// Create a restricted Lua sandbox for parsing and running job definitions
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only TABLE, STRING, MATH, COROUTINE; no IO, OS, PACKAGE, DEBUG
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        mlua::LuaOptions::default(),
    )?;

    // Remove the remaining ways to pull in external code
    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_log_module(&lua)?;
    register_job_module(&lua)?;

    Ok(lua)
}

/// Register the `log` module, bridging script messages to tracing
fn register_log_module(lua: &Lua) -> LuaResult<()> {
    let log_table = lua.create_table()?;

    log_table.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "job", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "job", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "job", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "job", "{}", msg);
            Ok(())
        })?,
    )?;

    lua.globals().set("log", log_table)?;
    Ok(())
}

/// Register the `job` module with the `stop` policy signal
fn register_job_module(lua: &Lua) -> LuaResult<()> {
    let job_table = lua.create_table()?;

    job_table.set(
        "stop",
        lua.create_function(|_, reason: Option<String>| -> LuaResult<()> {
            let reason = reason.unwrap_or_else(|| "stopped by job".to_string());
            Err(mlua::Error::RuntimeError(format!("{STOP_PREFIX}{reason}")))
        })?,
    )?;

    lua.globals().set("job", job_table)?;
    Ok(())
}

/// Extracts the stop reason if this error chain carries the stop marker
pub(crate) fn stop_reason(err: &mlua::Error) -> Option<String> {
    match err {
        mlua::Error::CallbackError { cause, .. } => stop_reason(cause),
        mlua::Error::WithContext { cause, .. } => stop_reason(cause),
        mlua::Error::RuntimeError(msg) => msg.find(STOP_PREFIX).map(|at| {
            msg[at + STOP_PREFIX.len()..]
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        }),
        _ => None,
    }
}
