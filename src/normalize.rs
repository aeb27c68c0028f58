//! Field normalization
//!
//! Converts the raw strings produced by the parsers into typed values:
//! memory in kilobytes, CPU time as `HH:MM:SS`, start times as
//! [`NaiveDateTime`] and priorities as [`PriorityClass`]. A value that cannot
//! be interpreted never aborts a snapshot; it is replaced by a placeholder and
//! logged.

use crate::error::{ProcscopeError, Result};
use crate::parse::FieldMap;
use crate::platform::Platform;
use crate::priority::PriorityClass;
use crate::record::ProcessRecord;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::warn;

/// Display format for start timestamps
pub const CANONICAL_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// `100ns` ticks per second, the unit of `Win32_Process.UserModeTime`
pub const TICKS_PER_SECOND: u64 = 10_000_000;

const ENGLISH_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Raw column names requested from `ps`
pub mod unix_fields {
    pub const PID: &str = "PID";
    pub const USER: &str = "RUSER";
    pub const VIRTUAL_SIZE: &str = "VSZ";
    pub const RESIDENT_SIZE: &str = "RSS";
    pub const CPU: &str = "%CPU";
    pub const STARTED: &str = "STARTED";
    pub const CPU_TIME: &str = "TIME";
    pub const NICE: &str = "NI";
    pub const PARENT_PID: &str = "PPID";
    pub const SHORT_NAME: &str = "UCOMM";
    pub const COMMAND: &str = "COMMAND";
}

/// Raw property names requested from `wmic`
pub mod windows_fields {
    pub const CAPTION: &str = "Caption";
    pub const PID: &str = "ProcessId";
    pub const NAME: &str = "Name";
    pub const USER_MODE_TIME: &str = "UserModeTime";
    pub const COMMAND_LINE: &str = "CommandLine";
    pub const WORKING_SET_SIZE: &str = "WorkingSetSize";
    pub const CREATION_DATE: &str = "CreationDate";
    pub const VIRTUAL_SIZE: &str = "VirtualSize";
    pub const PRIORITY: &str = "Priority";
    pub const PARENT_PID: &str = "ParentProcessId";

    pub const ALL: [&str; 10] = [
        CAPTION,
        PID,
        NAME,
        USER_MODE_TIME,
        COMMAND_LINE,
        WORKING_SET_SIZE,
        CREATION_DATE,
        VIRTUAL_SIZE,
        PRIORITY,
        PARENT_PID,
    ];
}

/// Start time used when the raw value cannot be parsed
pub fn placeholder_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    Bytes,
    Kilobytes,
}

/// Memory value in kilobytes, `None` when unknown
pub fn normalize_memory(field: &str, raw: &str, unit: MemoryUnit) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(value) => Some(match unit {
            MemoryUnit::Bytes => value / 1024,
            MemoryUnit::Kilobytes => value,
        }),
        Err(e) => {
            warn!(field, value = raw, error = %e, "unparsable memory value, treating as unknown");
            None
        }
    }
}

pub fn ticks_to_seconds(ticks: u64) -> u64 {
    ticks / TICKS_PER_SECOND
}

/// `HH:MM:SS`, hours are not wrapped at 24
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Parse a `CIM_DATETIME` value (`YYYYMMDDHHMMSS.ffffff+UUU`)
///
/// The fractional seconds and UTC offset are ignored; the result is the
/// local wall-clock time the value encodes.
pub fn parse_wmi_datetime(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    let stamp = raw
        .get(..14)
        .filter(|stamp| stamp.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| format_error("CreationDate", raw, "expected YYYYMMDDHHMMSS prefix"))?;

    NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
        .map_err(|e| format_error("CreationDate", raw, &e.to_string()))
}

/// How `ps` prints long start times (`lstart`)
///
/// The default matches English output such as `Sun Oct 18 20:33:01 2026`.
/// Tools running under another locale print localized month names; give
/// their names (January first) and a matching `chrono` pattern with
/// [`StartTimeFormat::custom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTimeFormat {
    pattern: String,
    months: Vec<String>,
}

impl Default for StartTimeFormat {
    fn default() -> Self {
        Self {
            pattern: "%b %d %H:%M:%S %Y".to_string(),
            months: ENGLISH_MONTHS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl StartTimeFormat {
    pub fn custom<I, S>(pattern: impl Into<String>, months: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let months: Vec<String> = months.into_iter().map(Into::into).collect();
        if months.len() != 12 {
            return Err(ProcscopeError::InvalidArguments(format!(
                "expected 12 month names, got {}",
                months.len()
            )));
        }
        Ok(Self {
            pattern: pattern.into(),
            months,
        })
    }

    /// Keep the English month names, change only the pattern
    pub fn with_pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parse a long start time; a leading weekday name is skipped
    pub fn parse(&self, raw: &str) -> Result<NaiveDateTime> {
        let tokens: Vec<&str> = raw
            .split_whitespace()
            .map(|t| self.to_english_month(t))
            .collect();
        if tokens.is_empty() {
            return Err(format_error("STARTED", raw, "empty value"));
        }

        let attempt = |tokens: &[&str]| {
            NaiveDateTime::parse_from_str(&tokens.join(" "), &self.pattern)
        };
        attempt(&tokens)
            .or_else(|first| {
                if tokens.len() > 1 {
                    attempt(&tokens[1..]).map_err(|_| first)
                } else {
                    Err(first)
                }
            })
            .map_err(|e| format_error("STARTED", raw, &e.to_string()))
    }

    fn to_english_month<'a>(&self, token: &'a str) -> &'a str {
        let candidate = token.trim_end_matches('.').to_lowercase();
        self.months
            .iter()
            .position(|month| month.to_lowercase() == candidate)
            .map(|idx| ENGLISH_MONTHS[idx])
            .unwrap_or(token)
    }
}

/// Per-pid data gathered by secondary bulk queries
///
/// On Windows the owner and CPU usage of a process are not part of the main
/// listing. They are collected separately and handed to the normalizer
/// explicitly, so nothing is cached between snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryData {
    pub owners: HashMap<String, String>,
    pub cpu: HashMap<String, String>,
}

impl AuxiliaryData {
    /// Read `pid:user` lines; malformed lines are ignored
    pub fn add_owner_listing(&mut self, raw: &str) {
        for line in raw.lines() {
            if let Some((pid, user)) = line.split_once(':') {
                let (pid, user) = (pid.trim(), user.trim());
                if !pid.is_empty() && !user.is_empty() {
                    self.owners.insert(pid.to_string(), user.to_string());
                }
            }
        }
    }

    /// Read `IDProcess`/`PercentProcessorTime` rows of the perf counter query
    pub fn add_cpu_rows(&mut self, rows: &[FieldMap]) {
        for row in rows {
            let pid = row.get("IDProcess");
            let cpu = row.get("PercentProcessorTime");
            if let (Some(pid), Some(cpu)) = (pid, cpu) {
                self.cpu.insert(pid.clone(), cpu.clone());
            }
        }
    }

    pub fn owner(&self, pid: &str) -> Option<String> {
        self.owners.get(pid).cloned()
    }

    pub fn cpu_usage(&self, pid: &str) -> Option<String> {
        self.cpu.get(pid).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty() && self.cpu.is_empty()
    }
}

/// Turns one parsed field map into a [`ProcessRecord`]
#[derive(Debug, Clone)]
pub struct Normalizer {
    platform: Platform,
    start_format: StartTimeFormat,
}

impl Normalizer {
    pub fn new(platform: Platform, start_format: StartTimeFormat) -> Self {
        Self {
            platform,
            start_format,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn normalize(&self, fields: &FieldMap, aux: &AuxiliaryData) -> ProcessRecord {
        let mut record = match self.platform {
            Platform::Unix => self.normalize_unix(fields, aux),
            Platform::Windows => self.normalize_windows(fields, aux),
        };
        record.priority_class = PriorityClass::from_raw_str(self.platform, &record.priority_raw);
        record.extra_data = fields.clone();
        record
    }

    fn normalize_unix(&self, fields: &FieldMap, aux: &AuxiliaryData) -> ProcessRecord {
        use unix_fields::*;

        let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or("");
        let kilobytes = |key: &str| normalize_memory(key, get(key), MemoryUnit::Kilobytes);
        let pid = get(PID);
        let mut record = ProcessRecord::new(pid);

        record.name = get(SHORT_NAME).to_string();
        record.display_caption = record.name.clone();
        record.owning_user = non_empty(get(USER)).or_else(|| aux.owner(pid));
        record.virtual_memory_kb = kilobytes(VIRTUAL_SIZE);
        record.working_set_kb = kilobytes(RESIDENT_SIZE);
        record.cpu_usage_percent = non_empty(get(CPU)).or_else(|| aux.cpu_usage(pid));
        record.cpu_time = non_empty(get(CPU_TIME));
        record.start_timestamp_raw = get(STARTED).to_string();
        record.start_timestamp = start_or_placeholder(self.start_format.parse(get(STARTED)));
        record.priority_raw = get(NICE).to_string();
        record.parent_pid = get(PARENT_PID).to_string();
        let command = non_empty(get(COMMAND));
        record.command_line = command.unwrap_or_else(|| record.name.clone());
        record
    }

    fn normalize_windows(&self, fields: &FieldMap, aux: &AuxiliaryData) -> ProcessRecord {
        use windows_fields::*;

        let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or("");
        let kilobytes = |key: &str| normalize_memory(key, get(key), MemoryUnit::Bytes);
        let pid = get(PID);
        let mut record = ProcessRecord::new(pid);

        record.name = get(NAME).to_string();
        record.display_caption = get(CAPTION).to_string();
        record.owning_user = aux.owner(pid);
        record.virtual_memory_kb = kilobytes(VIRTUAL_SIZE);
        record.working_set_kb = kilobytes(WORKING_SET_SIZE);
        record.cpu_usage_percent = aux.cpu_usage(pid);
        record.cpu_time = user_mode_time(get(USER_MODE_TIME));
        record.start_timestamp_raw = get(CREATION_DATE).to_string();
        record.start_timestamp = start_or_placeholder(parse_wmi_datetime(get(CREATION_DATE)));
        record.priority_raw = get(PRIORITY).to_string();
        record.parent_pid = get(PARENT_PID).to_string();
        record.command_line = get(COMMAND_LINE).to_string();
        record
    }
}

fn start_or_placeholder(parsed: Result<NaiveDateTime>) -> NaiveDateTime {
    parsed.unwrap_or_else(|e| {
        warn!(error = %e, "unparsable start time, using placeholder");
        placeholder_start()
    })
}

fn user_mode_time(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(ticks) => Some(format_duration(ticks_to_seconds(ticks))),
        Err(e) => {
            warn!(value = raw, error = %e, "unparsable UserModeTime");
            None
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn format_error(field: &str, value: &str, reason: &str) -> ProcscopeError {
    ProcscopeError::FieldFormat {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(timestamp: NaiveDateTime) -> String {
        timestamp.format(CANONICAL_FORMAT).to_string()
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_memory_units() {
        let kilobytes = |raw: &str| normalize_memory("VSZ", raw, MemoryUnit::Kilobytes);
        let bytes = |raw: &str| normalize_memory("VirtualSize", raw, MemoryUnit::Bytes);
        assert_eq!(kilobytes("2048"), Some(2048));
        assert_eq!(bytes("2097152"), Some(2048));
        assert_eq!(bytes(""), None);
        assert_eq!(kilobytes("n/a"), None);
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3_723), "01:02:03");
        assert_eq!(format_duration(100 * 3600 + 59), "100:00:59");
        assert_eq!(ticks_to_seconds(156_250_000), 15);
        assert_eq!(user_mode_time("36000000000"), Some("01:00:00".to_string()));
    }

    #[test]
    fn test_english_start_time() {
        let format = StartTimeFormat::default();
        assert_eq!(
            canonical(format.parse("oct 23 08:30:00 2016").unwrap()),
            "10/23/2016 08:30:00"
        );
        assert_eq!(
            canonical(format.parse("Sun Oct 18 20:33:01 2026").unwrap()),
            "10/18/2026 20:33:01"
        );
        assert_eq!(
            canonical(format.parse("Mon Oct  5 08:30:00 2026").unwrap()),
            "10/05/2026 08:30:00"
        );
    }

    #[test]
    fn test_localized_start_time() {
        let english = StartTimeFormat::default();
        assert!(english.parse("23 okt 2016 08:30:00").is_err());

        let months = [
            "jan", "feb", "mar", "apr", "mai", "jun", "jul", "aug", "sep", "okt", "nov", "des",
        ];
        let norwegian = StartTimeFormat::custom("%d %b %Y %H:%M:%S", months).unwrap();
        assert_eq!(
            canonical(norwegian.parse("23 okt 2016 08:30:00").unwrap()),
            "10/23/2016 08:30:00"
        );
    }

    #[test]
    fn test_custom_format_needs_twelve_months() {
        assert!(StartTimeFormat::custom("%b", ["jan"]).is_err());
    }

    #[test]
    fn test_wmi_datetime() {
        let parsed = parse_wmi_datetime("20161023083000.123456+120").unwrap();
        assert_eq!(canonical(parsed), "10/23/2016 08:30:00");
        assert!(parse_wmi_datetime("").is_err());
        assert!(parse_wmi_datetime("2016-10-23").is_err());
        assert!(parse_wmi_datetime("20161399083000.000000+000").is_err());
    }

    #[test]
    fn test_normalize_unix_row() {
        let normalizer = Normalizer::new(Platform::Unix, StartTimeFormat::default());
        let row = fields(&[
            ("PID", "123"),
            ("RUSER", "alice"),
            ("VSZ", "1000"),
            ("RSS", "200"),
            ("%CPU", "1.5"),
            ("STARTED", "Sun Oct 18 20:33:01 2026"),
            ("NI", "-5"),
            ("PPID", "1"),
            ("UCOMM", "sh"),
            ("COMMAND", "/bin/sh -c foo"),
        ]);
        let record = normalizer.normalize(&row, &AuxiliaryData::default());
        assert_eq!(record.pid, "123");
        assert_eq!(record.owning_user.as_deref(), Some("alice"));
        assert_eq!(record.virtual_memory_kb, Some(1000));
        assert_eq!(record.working_set_kb, Some(200));
        assert_eq!(record.cpu_usage_percent.as_deref(), Some("1.5"));
        assert_eq!(record.canonical_start(), "10/18/2026 20:33:01");
        assert_eq!(record.priority_class, PriorityClass::AboveNormal);
        assert_eq!(record.parent_pid, "1");
        assert_eq!(record.name, "sh");
        assert_eq!(record.command_line, "/bin/sh -c foo");
        assert_eq!(record.extra_data["RUSER"], "alice");
    }

    #[test]
    fn test_unix_command_defaults_to_short_name() {
        let normalizer = Normalizer::new(Platform::Unix, StartTimeFormat::default());
        let record = normalizer.normalize(
            &fields(&[("PID", "2"), ("UCOMM", "kthreadd"), ("STARTED", "garbage")]),
            &AuxiliaryData::default(),
        );
        assert_eq!(record.command_line, "kthreadd");
        assert_eq!(record.cpu_usage_percent, None);
        assert_eq!(record.canonical_start(), "01/01/2000 00:00:00");
        assert_eq!(record.start_timestamp_raw, "garbage");
    }

    #[test]
    fn test_normalize_windows_row() {
        let normalizer = Normalizer::new(Platform::Windows, StartTimeFormat::default());
        let row = fields(&[
            ("Caption", "notepad.exe"),
            ("CommandLine", "\"C:\\Windows\\notepad.exe\""),
            ("CreationDate", "20161023083000.123456+120"),
            ("Name", "notepad.exe"),
            ("ParentProcessId", "1000"),
            ("Priority", "8"),
            ("ProcessId", "4242"),
            ("UserModeTime", "156250000"),
            ("VirtualSize", "2097152"),
            ("WorkingSetSize", ""),
        ]);
        let mut aux = AuxiliaryData::default();
        aux.add_owner_listing("4242:alice\n17:SYSTEM\nbroken line\n");
        let cpu_row = fields(&[("IDProcess", "4242"), ("PercentProcessorTime", "3")]);
        aux.add_cpu_rows(&[cpu_row]);

        let record = normalizer.normalize(&row, &aux);
        assert_eq!(record.pid, "4242");
        assert_eq!(record.display_caption, "notepad.exe");
        assert_eq!(record.owning_user.as_deref(), Some("alice"));
        assert_eq!(record.cpu_usage_percent.as_deref(), Some("3"));
        assert_eq!(record.cpu_time.as_deref(), Some("00:00:15"));
        assert_eq!(record.virtual_memory_kb, Some(2048));
        assert_eq!(record.working_set_kb, None);
        assert_eq!(record.canonical_start(), "10/23/2016 08:30:00");
        assert_eq!(record.priority_class, PriorityClass::Normal);
        assert_eq!(record.parent_pid, "1000");
    }

    #[test]
    fn test_windows_bad_creation_date_uses_placeholder() {
        let normalizer = Normalizer::new(Platform::Windows, StartTimeFormat::default());
        let row = fields(&[
            ("Caption", "svchost.exe"),
            ("CreationDate", "garbage"),
            ("Name", "svchost.exe"),
            ("ParentProcessId", "600"),
            ("ProcessId", "812"),
        ]);
        let record = normalizer.normalize(&row, &AuxiliaryData::default());
        assert_eq!(record.canonical_start(), "01/01/2000 00:00:00");
        assert_eq!(record.start_timestamp, placeholder_start());
        assert_eq!(record.start_timestamp_raw, "garbage");
        assert_eq!(record.name, "svchost.exe");

        let record = normalizer.normalize(
            &fields(&[("ProcessId", "813"), ("CreationDate", "")]),
            &AuxiliaryData::default(),
        );
        assert_eq!(record.canonical_start(), "01/01/2000 00:00:00");
    }

    #[test]
    fn test_owner_listing_ignores_noise() {
        let mut aux = AuxiliaryData::default();
        aux.add_owner_listing("\r\n12:\n:bob\n4:SYSTEM\r\n");
        assert_eq!(aux.owners.len(), 1);
        assert_eq!(aux.owners["4"], "SYSTEM");
    }
}
