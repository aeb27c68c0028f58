use crate::normalize::{placeholder_start, CANONICAL_FORMAT};
use crate::parse::FieldMap;
use crate::priority::PriorityClass;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Name given to records synthesized for parents missing from a snapshot
pub const UNKNOWN_NAME: &str = "Unknown";

/// Index of a record inside the snapshot that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordHandle(pub(crate) usize);

impl RecordHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One observed (or synthesized) process
///
/// Relationships are stored as [`RecordHandle`]s into the owning
/// [`Snapshot`](crate::Snapshot); use its `parent`/`children` accessors to
/// navigate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: String,
    pub name: String,
    pub display_caption: String,
    pub owning_user: Option<String>,
    pub virtual_memory_kb: Option<u64>,
    pub working_set_kb: Option<u64>,
    /// Not collected in fast mode
    pub cpu_usage_percent: Option<String>,
    /// Accumulated CPU time as `HH:MM:SS`
    pub cpu_time: Option<String>,
    pub start_timestamp_raw: String,
    pub start_timestamp: NaiveDateTime,
    pub priority_raw: String,
    pub priority_class: PriorityClass,
    pub command_line: String,
    pub parent_pid: String,
    /// Every raw field the listing tool reported for this process
    pub extra_data: FieldMap,
    pub placeholder: bool,
    pub(crate) parent: Option<RecordHandle>,
    pub(crate) children: Vec<RecordHandle>,
}

impl ProcessRecord {
    /// Empty record with only a pid, used as a base by the normalizer
    pub fn new(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            name: String::new(),
            display_caption: String::new(),
            owning_user: None,
            virtual_memory_kb: None,
            working_set_kb: None,
            cpu_usage_percent: None,
            cpu_time: None,
            start_timestamp_raw: String::new(),
            start_timestamp: placeholder_start(),
            priority_raw: String::new(),
            priority_class: PriorityClass::Normal,
            command_line: String::new(),
            parent_pid: String::new(),
            extra_data: FieldMap::new(),
            placeholder: false,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Stand-in for a parent process that is not part of the snapshot
    pub fn placeholder(pid: impl Into<String>) -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            display_caption: UNKNOWN_NAME.to_string(),
            placeholder: true,
            ..Self::new(pid)
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn parent_handle(&self) -> Option<RecordHandle> {
        self.parent
    }

    pub fn child_handles(&self) -> &[RecordHandle] {
        &self.children
    }

    /// Start time as `MM/DD/YYYY HH:MM:SS`
    pub fn canonical_start(&self) -> String {
        self.start_timestamp.format(CANONICAL_FORMAT).to_string()
    }

    pub fn summary(&self) -> String {
        format!(
            "NAME:{} PID:{} CPU:{} MEM:{} PRIORITY:{} CMD:{}",
            self.name,
            self.pid,
            self.cpu_usage_percent.as_deref().unwrap_or("-"),
            self.working_set_kb
                .map(|kb| kb.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.priority_class,
            self.command_line
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_record() {
        let record = ProcessRecord::placeholder("1");
        assert_eq!(record.pid, "1");
        assert_eq!(record.name, UNKNOWN_NAME);
        assert!(record.is_placeholder());
        assert!(record.parent_pid.is_empty());
        assert_eq!(record.canonical_start(), "01/01/2000 00:00:00");
    }

    #[test]
    fn test_summary_marks_unknown_values() {
        let mut record = ProcessRecord::new("42");
        record.name = "bash".to_string();
        record.working_set_kb = Some(2048);
        assert_eq!(
            record.summary(),
            "NAME:bash PID:42 CPU:- MEM:2048 PRIORITY:normal CMD:"
        );
    }
}
