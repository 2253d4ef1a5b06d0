//! Local command execution

use std::process::Command;

use crate::error::{ExecutionError, ValidationError};
use crate::task::{TaskFlow, run_command};

/// A local command: either a shell line or an explicit argv vector
#[derive(Debug, Clone)]
pub enum CommandLine {
    /// Run through `sh -c`
    Shell(String),
    /// Run directly, no shell interpretation
    Argv(Vec<String>),
}

/// Executes a command on the machine running the job
#[derive(Debug, Clone)]
pub struct CmdTask {
    command: CommandLine,
}

impl CmdTask {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }

    pub(crate) fn command_text(&self) -> String {
        match &self.command {
            CommandLine::Shell(line) => line.clone(),
            CommandLine::Argv(argv) => argv.join(" "),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        let empty = match &self.command {
            CommandLine::Shell(line) => line.trim().is_empty(),
            CommandLine::Argv(argv) => argv.is_empty(),
        };
        if empty {
            return Err(ValidationError::EmptyCommand);
        }
        Ok(())
    }

    pub(crate) fn run(&mut self) -> Result<TaskFlow, ExecutionError> {
        let mut command = match &self.command {
            CommandLine::Shell(line) => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(line);
                c
            }
            CommandLine::Argv(argv) => {
                let mut c = Command::new(&argv[0]);
                c.args(&argv[1..]);
                c
            }
        };
        run_command(&self.command_text(), &mut command)?;
        Ok(TaskFlow::Continue)
    }
}
