//! Per-process details that are not part of the bulk listing
//!
//! Thread count and minor page faults are queried for one pid at a time,
//! which also tells whether the process is still running.

use crate::error::{ProcscopeError, Result};
use crate::executor::CommandOutput;
use crate::parse::{FieldMap, ParseStrategy};
use crate::platform::Platform;
use serde::Serialize;
use std::fmt;
use tracing::warn;

const MINOR_FAULTS: &str = "MINFLT";
const THREADS: &str = "NLWP";
const PAGE_FAULTS: &str = "PageFaults";
const THREAD_COUNT: &str = "ThreadCount";

/// Fresh details about a single process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessExtra {
    pub pid: String,
    /// The process was present when queried
    pub alive: bool,
    pub thread_count: Option<u64>,
    /// Minor faults on Unix; all page faults on Windows
    pub minor_page_faults: Option<u64>,
}

impl ProcessExtra {
    /// A process that was not found
    pub fn gone(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            ..Self::default()
        }
    }

    /// Interpret the output of the query built by [`query`]
    ///
    /// An empty result means the process is gone. A command that failed
    /// without printing anything but diagnostics is an error, since the tool
    /// itself could not answer.
    pub fn from_output(platform: Platform, pid: &str, output: &CommandOutput) -> Result<Self> {
        let stderr = output.stderr.trim();
        if output.stdout.trim().is_empty() && !output.success() && !stderr.is_empty() {
            let (program, _) = query(platform, pid);
            return Err(ProcscopeError::acquisition(program, stderr));
        }

        let (faults_key, threads_key) = match platform {
            Platform::Unix => (MINOR_FAULTS, THREADS),
            Platform::Windows => (PAGE_FAULTS, THREAD_COUNT),
        };
        let outcome = strategy(platform).parse(&output.stdout);
        let Some(row) = outcome.rows.first() else {
            return Ok(Self::gone(pid));
        };

        Ok(Self {
            pid: pid.to_string(),
            alive: true,
            thread_count: counter(row, threads_key),
            minor_page_faults: counter(row, faults_key),
        })
    }
}

impl fmt::Display for ProcessExtra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: Option<u64>| value.map_or("-".to_string(), |v| v.to_string());
        write!(
            f,
            "pid {} alive {} threads {} page faults {}",
            self.pid,
            self.alive,
            show(self.thread_count),
            show(self.minor_page_faults)
        )
    }
}

/// Program and arguments that ask for one process's details
pub fn query(platform: Platform, pid: &str) -> (&'static str, Vec<String>) {
    match platform {
        Platform::Unix => {
            let args = vec![
                "-ww".to_string(),
                "-p".to_string(),
                pid.to_string(),
                "-o".to_string(),
                format!("min_flt={}", MINOR_FAULTS),
                "-o".to_string(),
                format!("nlwp={}", THREADS),
            ];
            ("ps", args)
        }
        Platform::Windows => {
            let args = vec![
                "process".to_string(),
                "where".to_string(),
                format!("ProcessId={}", pid),
                "get".to_string(),
                format!("{},{}", THREAD_COUNT, PAGE_FAULTS),
                "/VALUE".to_string(),
            ];
            ("wmic", args)
        }
    }
}

fn strategy(platform: Platform) -> ParseStrategy {
    match platform {
        Platform::Unix => ParseStrategy::FixedWidth,
        Platform::Windows => ParseStrategy::key_value([PAGE_FAULTS, THREAD_COUNT], '='),
    }
}

fn counter(row: &FieldMap, key: &str) -> Option<u64> {
    let raw = row.get(key)?.trim();
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(field = key, value = raw, error = %e, "unparsable counter");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn interpret(platform: Platform, output: CommandOutput) -> Result<ProcessExtra> {
        ProcessExtra::from_output(platform, "42", &output)
    }

    #[test]
    fn test_unix_query_arguments() {
        let (program, args) = query(Platform::Unix, "42");
        assert_eq!(program, "ps");
        assert_eq!(
            args,
            vec!["-ww", "-p", "42", "-o", "min_flt=MINFLT", "-o", "nlwp=NLWP"]
        );
    }

    #[test]
    fn test_windows_query_arguments() {
        let (program, args) = query(Platform::Windows, "42");
        assert_eq!(program, "wmic");
        assert_eq!(args[2], "ProcessId=42");
        assert_eq!(args[4], "ThreadCount,PageFaults");
    }

    #[test]
    fn test_unix_running_process() {
        let raw = concat!("MINFLT NLWP\n", "  5321    4\n");
        let extra = interpret(Platform::Unix, output(0, raw, "")).unwrap();
        assert!(extra.alive);
        assert_eq!(extra.thread_count, Some(4));
        assert_eq!(extra.minor_page_faults, Some(5321));
    }

    #[test]
    fn test_unix_header_only_means_gone() {
        let header_only = output(1, "MINFLT NLWP\n", "");
        let extra = interpret(Platform::Unix, header_only).unwrap();
        assert_eq!(extra, ProcessExtra::gone("42"));
    }

    #[test]
    fn test_windows_blocks() {
        let raw = "\r\n\r\nPageFaults=1877\r\nThreadCount=12\r\n\r\n\r\n";
        let extra = interpret(Platform::Windows, output(0, raw, "")).unwrap();
        assert!(extra.alive);
        assert_eq!(extra.thread_count, Some(12));
        assert_eq!(extra.minor_page_faults, Some(1877));
    }

    #[test]
    fn test_windows_no_instance_means_gone() {
        let no_instance = output(0, "", "No Instance(s) Available.\r\n");
        let extra = interpret(Platform::Windows, no_instance).unwrap();
        assert!(!extra.alive);
        assert_eq!(extra.thread_count, None);
    }

    #[test]
    fn test_unsupported_columns_are_an_error() {
        let failed = output(1, "", "ps: nlwp: keyword not found");
        let err = interpret(Platform::Unix, failed).unwrap_err();
        assert!(matches!(err, ProcscopeError::Acquisition { .. }));
    }

    #[test]
    fn test_unparsable_counter_is_unknown() {
        let raw = concat!("MINFLT NLWP\n", "     -    1\n");
        let extra = interpret(Platform::Unix, output(0, raw, "")).unwrap();
        assert!(extra.alive);
        assert_eq!(extra.minor_page_faults, None);
        assert_eq!(extra.thread_count, Some(1));
        let line = extra.to_string();
        assert_eq!(line, "pid 42 alive true threads 1 page faults -");
    }
}
