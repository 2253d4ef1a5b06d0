//! Wharf Lua Infrastructure
//!
//! Job definitions are Lua artifacts: a chunk evaluated in a restricted
//! sandbox that returns a table describing the default connection, the
//! optional accepted-credential set, and the ordered task list. This crate
//! provides:
//! - The sandbox (no io/os/require; `log` and `job.stop` registered)
//! - The definition loader and parser (table -> validated `Job`)
//! - The task-table converter, shared by the loader and by `expand`
//!   callbacks that produce tasks at run time

pub mod definition;
pub mod error;
pub mod sandbox;
pub mod tasks;

pub use definition::{JobDefinition, load_definition, parse_definition};
pub use error::LoadError;
pub use sandbox::create_sandbox;
