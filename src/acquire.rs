//! Snapshot acquisition
//!
//! Runs the platform's listing tools through a [`CommandExecutor`] and drives
//! the captures through parsing, normalization and graph assembly.
//!
//! ```text
//! unix:    ps -o ... (listing)  +  ps -o pid,command (backfill)
//! windows: wmic process ...     +  wmic perf counters (cpu)  +  powershell (owners)
//! ```
//!
//! [`ProcessService::extra_info`] queries a single pid on demand.

use crate::control::validate_pid;
use crate::error::{ProcscopeError, Result};
use crate::executor::{CommandExecutor, CommandOutput, SystemExecutor};
use crate::extra::{self, ProcessExtra};
use crate::normalize::{unix_fields, windows_fields, AuxiliaryData, Normalizer, StartTimeFormat};
use crate::parse::{FieldMap, ParseStrategy};
use crate::platform::Platform;
use crate::snapshot::Snapshot;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const PS: &str = "ps";
const WMIC: &str = "wmic";
const POWERSHELL: &str = "powershell";

const OWNER_SCRIPT: &str = "Get-CimInstance Win32_Process | ForEach-Object { \
     $o = Invoke-CimMethod -InputObject $_ -MethodName GetOwner; \
     if ($o.User) { '{0}:{1}' -f $_.ProcessId, $o.User } }";

/// Knobs for a single snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Skip CPU usage and, on Windows, the owner lookup
    pub fast_mode: bool,
    /// Keep only processes with exactly this name
    pub name_filter: Option<String>,
    pub start_format: StartTimeFormat,
}

impl SnapshotOptions {
    pub fn fast(mut self, fast_mode: bool) -> Self {
        self.fast_mode = fast_mode;
        self
    }

    pub fn name_filter(mut self, name: impl Into<String>) -> Self {
        self.name_filter = Some(name.into());
        self
    }

    pub fn start_format(mut self, start_format: StartTimeFormat) -> Self {
        self.start_format = start_format;
        self
    }
}

/// Produces [`Snapshot`]s of the running system
#[derive(Debug, Clone)]
pub struct ProcessService<E> {
    executor: E,
    platform: Platform,
    options: SnapshotOptions,
}

impl ProcessService<SystemExecutor> {
    /// Service for the host platform using its native tools
    pub fn system(options: SnapshotOptions) -> Self {
        Self::new(SystemExecutor, Platform::current(), options)
    }
}

impl<E: CommandExecutor> ProcessService<E> {
    pub fn new(executor: E, platform: Platform, options: SnapshotOptions) -> Self {
        Self {
            executor,
            platform,
            options,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    /// Take a fresh snapshot
    ///
    /// Only a failed main listing is an error. Secondary queries (command
    /// lines, CPU usage, owners) degrade to missing values when they fail.
    pub fn snapshot(&self) -> Result<Snapshot> {
        match self.platform {
            Platform::Unix => {
                let listing_args = unix_listing_args(self.options.fast_mode);
                let listing = self.run_required(PS, listing_args)?;
                let backfill = self.run_optional(PS, unix_command_args());
                let aux = AuxiliaryData::default();
                self.snapshot_from_capture(&listing, backfill.as_deref(), &aux)
            }
            Platform::Windows => {
                let mut aux = AuxiliaryData::default();
                if !self.options.fast_mode {
                    if let Some(raw) = self.run_optional(WMIC, windows_cpu_args()) {
                        aux.add_cpu_rows(&cpu_strategy().parse(&raw).rows);
                    }
                    if let Some(raw) = self.run_optional(POWERSHELL, windows_owner_args()) {
                        aux.add_owner_listing(&raw);
                    }
                }
                let listing = self.run_required(WMIC, windows_listing_args())?;
                self.snapshot_from_capture(&listing, None, &aux)
            }
        }
    }

    /// Build a snapshot from captures gathered elsewhere
    ///
    /// `main` is the listing in the platform's layout. `command_backfill` is
    /// an optional `PID COMMAND` table whose command lines replace the ones
    /// in `main` (Unix only).
    pub fn snapshot_from_capture(
        &self,
        main: &str,
        command_backfill: Option<&str>,
        aux: &AuxiliaryData,
    ) -> Result<Snapshot> {
        let (program, strategy) = match self.platform {
            Platform::Unix => (PS, ParseStrategy::FixedWidth),
            Platform::Windows => (WMIC, listing_strategy()),
        };
        if main.trim().is_empty() {
            return Err(ProcscopeError::acquisition(program, "no header in listing"));
        }

        let mut outcome = strategy.parse(main);
        if let Some(raw) = command_backfill {
            backfill_commands(&mut outcome.rows, raw);
        }

        let normalizer = Normalizer::new(self.platform, self.options.start_format.clone());
        let records: Vec<_> = outcome
            .rows
            .iter()
            .map(|row| normalizer.normalize(row, aux))
            .filter(|record| match &self.options.name_filter {
                Some(name) => &record.name == name,
                None => true,
            })
            .collect();

        info!(
            platform = %self.platform,
            processes = records.len(),
            skipped = outcome.failures.len(),
            "snapshot taken"
        );
        Ok(Snapshot::build(self.platform, records, outcome.failures))
    }

    /// Thread count and page faults of one process, queried right now
    ///
    /// A pid that no longer exists is not an error; the result reports it as
    /// not alive.
    pub fn extra_info(&self, pid: &str) -> Result<ProcessExtra> {
        let pid = validate_pid(pid)
            .ok_or_else(|| ProcscopeError::InvalidArguments(format!("invalid pid {:?}", pid)))?;
        let (program, args) = extra::query(self.platform, &pid);
        let output = self.executor.execute(program, &args)?;
        let extra = ProcessExtra::from_output(self.platform, &pid, &output)?;
        debug!(%extra, "extra info");
        Ok(extra)
    }

    fn run_required(&self, program: &str, args: Vec<String>) -> Result<String> {
        let output = self.executor.execute(program, &args)?;
        if !output.success() {
            if output.stdout.trim().is_empty() {
                return Err(ProcscopeError::acquisition(program, failure_reason(&output)));
            }
            warn!(
                program,
                exit_code = output.exit_code,
                "listing exited non-zero, using its output"
            );
        }
        Ok(output.stdout)
    }

    fn run_optional(&self, program: &str, args: Vec<String>) -> Option<String> {
        match self.executor.execute(program, &args) {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                let reason = failure_reason(&output);
                warn!(program, %reason, "secondary query failed, continuing without it");
                None
            }
            Err(e) => {
                warn!(program, error = %e, "secondary query failed, continuing without it");
                None
            }
        }
    }
}

fn failure_reason(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exited with status {}", output.exit_code)
    } else {
        format!("exited with status {}: {}", output.exit_code, stderr)
    }
}

fn backfill_commands(rows: &mut [FieldMap], raw: &str) {
    let commands: HashMap<String, String> = ParseStrategy::FixedWidth
        .parse(raw)
        .rows
        .into_iter()
        .filter_map(|mut row| {
            let pid = row.remove(unix_fields::PID)?;
            let command = row.remove(unix_fields::COMMAND)?;
            (!command.is_empty()).then_some((pid, command))
        })
        .collect();
    debug!(commands = commands.len(), "backfilling command lines");

    for row in rows {
        let command = row
            .get(unix_fields::PID)
            .and_then(|pid| commands.get(pid))
            .cloned();
        if let Some(command) = command {
            row.insert(unix_fields::COMMAND.to_string(), command);
        }
    }
}

fn column(spec: &str, header: &str) -> [String; 2] {
    ["-o".to_string(), format!("{}={}", spec, header)]
}

fn unix_listing_args(fast_mode: bool) -> Vec<String> {
    use unix_fields::*;

    let mut columns = vec![
        ("pid", PID),
        ("ruser", USER),
        ("vsz", VIRTUAL_SIZE),
        ("rss", RESIDENT_SIZE),
    ];
    if !fast_mode {
        columns.push(("%cpu", CPU));
    }
    columns.extend([
        ("lstart", STARTED),
        ("time", CPU_TIME),
        ("nice", NICE),
        ("ppid", PARENT_PID),
        ("ucomm", SHORT_NAME),
    ]);

    let mut args = vec!["-e".to_string(), "-ww".to_string()];
    for (spec, header) in columns {
        args.extend(column(spec, header));
    }
    args
}

fn unix_command_args() -> Vec<String> {
    let mut args = vec!["-e".to_string(), "-ww".to_string()];
    args.extend(column("pid", unix_fields::PID));
    args.extend(column("command", unix_fields::COMMAND));
    args
}

fn listing_strategy() -> ParseStrategy {
    ParseStrategy::key_value(windows_fields::ALL, '=')
}

fn cpu_strategy() -> ParseStrategy {
    ParseStrategy::key_value(["IDProcess", "PercentProcessorTime"], '=')
}

fn windows_listing_args() -> Vec<String> {
    vec![
        "process".to_string(),
        "get".to_string(),
        windows_fields::ALL.join(","),
        "/VALUE".to_string(),
    ]
}

fn windows_cpu_args() -> Vec<String> {
    [
        "path",
        "Win32_PerfFormattedData_PerfProc_Process",
        "get",
        "IDProcess,PercentProcessorTime",
        "/VALUE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn windows_owner_args() -> Vec<String> {
    ["-NoProfile", "-NonInteractive", "-Command", OWNER_SCRIPT]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
