//! Command execution boundary
//!
//! Everything procscope learns about processes comes from running native
//! tools (`ps`, `wmic`, `kill`, `taskkill`, ...). This module hides how those
//! tools are launched behind [`CommandExecutor`] so that the parsing pipeline
//! can be driven from canned captures.

use crate::error::{ProcscopeError, Result};
use std::process::Command;
use tracing::debug;

/// Exit code and captured text of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external command to completion
///
/// Implementations block the calling thread until the command exits. No
/// timeout is applied.
pub trait CommandExecutor {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        (**self).execute(program, args)
    }
}

/// Executor backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program, ?args, "executing command");

        let output = match Command::new(program).args(args).output() {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("failed to start: {}", e);
                return Err(ProcscopeError::acquisition(program, reason));
            }
        };

        let exit_code = exit_code_of(&output.status);
        let bytes = output.stdout.len();
        debug!(program, exit_code, bytes, "command finished");

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 255,
    }
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(255)
}
