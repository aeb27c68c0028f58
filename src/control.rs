//! Stop, kill and re-prioritize processes through the platform's tools

use crate::error::{ProcscopeError, Result};
use crate::executor::{CommandExecutor, CommandOutput, SystemExecutor};
use crate::platform::Platform;
use crate::priority::PriorityClass;
use crate::record::ProcessRecord;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Outcome of a control operation
///
/// Control never raises: a missing process, a refused permission or a tool
/// that could not be started all end up as `success == false` with the
/// reason in `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResult {
    pub success: bool,
    pub message: Option<String>,
}

impl ControlResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ProcscopeError::ControlFailed(
                self.message.unwrap_or_else(|| "unknown failure".to_string()),
            ))
        }
    }
}

impl fmt::Display for ControlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.success, &self.message) {
            (true, _) => f.write_str("ok"),
            (false, Some(message)) => write!(f, "failed: {}", message),
            (false, None) => f.write_str("failed"),
        }
    }
}

/// Requested priority, either a portable class or a platform raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityValue {
    Class(PriorityClass),
    Raw(i64),
}

impl PriorityValue {
    pub fn raw(self, platform: Platform) -> i64 {
        match self {
            PriorityValue::Class(class) => class.raw(platform),
            PriorityValue::Raw(raw) => raw,
        }
    }
}

impl From<PriorityClass> for PriorityValue {
    fn from(class: PriorityClass) -> Self {
        PriorityValue::Class(class)
    }
}

impl From<i64> for PriorityValue {
    fn from(raw: i64) -> Self {
        PriorityValue::Raw(raw)
    }
}

impl std::str::FromStr for PriorityValue {
    type Err = ProcscopeError;

    /// An integer is a raw value, anything else must name a class
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().parse::<i64>() {
            Ok(raw) => Ok(PriorityValue::Raw(raw)),
            Err(_) => s.parse::<PriorityClass>().map(PriorityValue::Class),
        }
    }
}

/// Issues control commands for one platform
#[derive(Debug, Clone)]
pub struct ProcessController<E> {
    executor: E,
    platform: Platform,
}

impl ProcessController<SystemExecutor> {
    pub fn system() -> Self {
        Self::new(SystemExecutor, Platform::current())
    }
}

impl<E: CommandExecutor> ProcessController<E> {
    pub fn new(executor: E, platform: Platform) -> Self {
        Self { executor, platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Ask the process to terminate
    pub fn stop(&self, pid: &str) -> ControlResult {
        let Some(pid) = validate_pid(pid) else {
            return invalid_pid(pid);
        };
        let (program, args) = match self.platform {
            Platform::Unix => ("kill", vec!["-15".to_string(), pid]),
            Platform::Windows => ("taskkill", vec!["/PID".to_string(), pid]),
        };
        self.run(program, args, Diagnostics::ExitCode)
    }

    /// Terminate the process without giving it a chance to clean up
    pub fn kill(&self, pid: &str) -> ControlResult {
        let Some(pid) = validate_pid(pid) else {
            return invalid_pid(pid);
        };
        let (program, args) = match self.platform {
            Platform::Unix => ("kill", vec!["-9".to_string(), pid]),
            Platform::Windows => ("taskkill", vec!["/PID".to_string(), pid, "/F".to_string()]),
        };
        self.run(program, args, Diagnostics::ExitCode)
    }

    /// Change the scheduling priority of a process
    ///
    /// `renice` and `SetPriority` both exit zero on some refusals and only
    /// print a diagnostic, so any diagnostic text counts as failure.
    pub fn set_priority(&self, pid: &str, value: impl Into<PriorityValue>) -> ControlResult {
        let Some(pid) = validate_pid(pid) else {
            return invalid_pid(pid);
        };
        let raw = value.into().raw(self.platform);
        match self.platform {
            Platform::Unix => self.run(
                "renice",
                vec!["-n".to_string(), raw.to_string(), "-p".to_string(), pid],
                Diagnostics::Stderr,
            ),
            Platform::Windows => self.run(
                "powershell",
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    set_priority_script(&pid, raw),
                ],
                Diagnostics::AnyOutput,
            ),
        }
    }

    /// [`ProcessController::set_priority`] that keeps `record` in sync
    pub fn set_record_priority(
        &self,
        record: &mut ProcessRecord,
        value: impl Into<PriorityValue>,
    ) -> ControlResult {
        let raw = value.into().raw(self.platform);
        let result = self.set_priority(&record.pid, PriorityValue::Raw(raw));
        if result.success {
            record.priority_raw = raw.to_string();
            record.priority_class = PriorityClass::from_raw(self.platform, raw);
        }
        result
    }

    fn run(&self, program: &str, args: Vec<String>, diagnostics: Diagnostics) -> ControlResult {
        debug!(program, ?args, "issuing control command");
        match self.executor.execute(program, &args) {
            Ok(output) => {
                let result = diagnostics.judge(&output);
                if !result.success {
                    warn!(program, ?args, reason = ?result.message, "control command failed");
                }
                result
            }
            Err(e) => {
                warn!(program, error = %e, "control command could not be issued");
                ControlResult::failed(e.to_string())
            }
        }
    }
}

/// What counts as failure besides a non-zero exit code
#[derive(Debug, Clone, Copy)]
enum Diagnostics {
    ExitCode,
    Stderr,
    AnyOutput,
}

impl Diagnostics {
    fn judge(self, output: &CommandOutput) -> ControlResult {
        let stderr = output.stderr.trim();
        let text = match self {
            Diagnostics::ExitCode => "",
            Diagnostics::Stderr => stderr,
            Diagnostics::AnyOutput if stderr.is_empty() => output.stdout.trim(),
            Diagnostics::AnyOutput => stderr,
        };

        if output.success() && text.is_empty() {
            return ControlResult::ok();
        }
        let detail = if !text.is_empty() {
            text
        } else if !stderr.is_empty() {
            stderr
        } else {
            output.stdout.trim()
        };
        if detail.is_empty() {
            ControlResult::failed(format!("exited with status {}", output.exit_code))
        } else {
            ControlResult::failed(format!("exited with status {}: {}", output.exit_code, detail))
        }
    }
}

pub(crate) fn validate_pid(pid: &str) -> Option<String> {
    let pid = pid.trim();
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(pid.to_string())
}

fn invalid_pid(pid: &str) -> ControlResult {
    ControlResult::failed(format!("invalid pid {:?}", pid))
}

fn set_priority_script(pid: &str, raw: i64) -> String {
    format!(
        "$r = Invoke-CimMethod -Query 'SELECT * FROM Win32_Process WHERE ProcessId = {}' \
         -MethodName SetPriority -Arguments @{{ Priority = [uint32]{} }}; \
         if ($r.ReturnValue -ne 0) {{ \"SetPriority returned $($r.ReturnValue)\" }}",
        pid, raw
    )
}
