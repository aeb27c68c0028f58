//! Immutable, queryable process snapshot

use crate::error::{ProcscopeError, Result};
use crate::graph;
use crate::parse::RowParseFailure;
use crate::platform::{self, Platform};
use crate::record::{ProcessRecord, RecordHandle};
use serde::Serialize;
use std::fmt::Write as _;

/// Point-in-time collection of processes with resolved relationships
///
/// The snapshot owns every record. Records refer to each other through
/// [`RecordHandle`]s and are only reachable through the snapshot, so they can
/// never outlive it.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    platform: Platform,
    records: Vec<ProcessRecord>,
    parse_failures: Vec<RowParseFailure>,
}

impl Snapshot {
    /// Assemble the process graph over freshly normalized records
    pub fn build(
        platform: Platform,
        records: Vec<ProcessRecord>,
        parse_failures: Vec<RowParseFailure>,
    ) -> Self {
        Self {
            platform,
            records: graph::build(records),
            parse_failures,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Every record, observed ones first, placeholders after
    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProcessRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows the parser had to skip while building this snapshot
    pub fn parse_failures(&self) -> &[RowParseFailure] {
        &self.parse_failures
    }

    pub fn get(&self, handle: RecordHandle) -> Option<&ProcessRecord> {
        self.records.get(handle.0)
    }

    pub fn handle_of(&self, record: &ProcessRecord) -> Option<RecordHandle> {
        self.records
            .iter()
            .position(|candidate| std::ptr::eq(candidate, record))
            .map(RecordHandle)
    }

    pub fn parent(&self, record: &ProcessRecord) -> Option<&ProcessRecord> {
        record.parent.and_then(|handle| self.get(handle))
    }

    pub fn children<'a>(
        &'a self,
        record: &'a ProcessRecord,
    ) -> impl Iterator<Item = &'a ProcessRecord> + 'a {
        record
            .children
            .iter()
            .filter_map(move |handle| self.get(*handle))
    }

    /// Records without a parent; placeholders in every regular snapshot
    pub fn roots(&self) -> impl Iterator<Item = &ProcessRecord> + '_ {
        self.records.iter().filter(|record| record.parent.is_none())
    }

    /// Lookup by pid, preferring an observed record over a placeholder
    pub fn by_pid(&self, pid: &str) -> Option<&ProcessRecord> {
        let mut matches = self.records.iter().filter(|record| record.pid == pid);
        let first = matches.next()?;
        if first.is_placeholder() {
            let observed = matches.find(|record| !record.is_placeholder());
            Some(observed.unwrap_or(first))
        } else {
            Some(first)
        }
    }

    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ProcessRecord> + 'a {
        self.observed().filter(move |record| record.name == name)
    }

    pub fn by_command<'a>(
        &'a self,
        command: &'a str,
    ) -> impl Iterator<Item = &'a ProcessRecord> + 'a {
        self.observed()
            .filter(move |record| record.command_line == command)
    }

    pub fn by_user<'a>(&'a self, user: &'a str) -> impl Iterator<Item = &'a ProcessRecord> + 'a {
        self.observed()
            .filter(move |record| record.owning_user.as_deref() == Some(user))
    }

    /// The record of the process running this code
    ///
    /// Fails with [`ProcscopeError::NotFound`] when the calling process is not
    /// part of the snapshot.
    pub fn current_process(&self) -> Result<&ProcessRecord> {
        self.process_with_id(&platform::current_pid())
    }

    /// Like [`Snapshot::current_process`] for an explicitly supplied id
    pub fn process_with_id(&self, pid: &str) -> Result<&ProcessRecord> {
        self.observed()
            .find(|record| record.pid == pid)
            .ok_or_else(|| ProcscopeError::NotFound {
                pid: pid.to_string(),
            })
    }

    /// Depth-first walk from every root, children in insertion order
    pub fn walk(&self) -> Vec<(usize, &ProcessRecord)> {
        let mut visited = Vec::with_capacity(self.records.len());
        let mut stack: Vec<(usize, RecordHandle)> = self
            .records
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, record)| record.parent.is_none())
            .map(|(idx, _)| (0, RecordHandle(idx)))
            .collect();

        while let Some((depth, handle)) = stack.pop() {
            let Some(record) = self.get(handle) else {
                continue;
            };
            visited.push((depth, record));
            for child in record.children.iter().rev() {
                stack.push((depth + 1, *child));
            }
        }
        visited
    }

    /// One line per record, `-` repeated once per level of depth
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for (depth, record) in self.walk() {
            let _ = writeln!(out, "{}{} {}", "-".repeat(depth), record.name, record.pid);
        }
        out
    }

    fn observed(&self) -> impl Iterator<Item = &ProcessRecord> + '_ {
        self.records
            .iter()
            .filter(|record| !record.is_placeholder())
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a ProcessRecord;
    type IntoIter = std::slice::Iter<'a, ProcessRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: &str, parent_pid: &str, name: &str) -> ProcessRecord {
        let mut record = ProcessRecord::new(pid);
        record.name = name.to_string();
        record.command_line = format!("/usr/bin/{}", name);
        record.parent_pid = parent_pid.to_string();
        record
    }

    fn sample() -> Snapshot {
        let mut init = record("1", "0", "init");
        init.owning_user = Some("root".to_string());
        let mut shell = record("20", "1", "bash");
        shell.owning_user = Some("alice".to_string());
        let mut vim = record("21", "20", "vim");
        vim.owning_user = Some("alice".to_string());
        let mut other = record("30", "1", "bash");
        other.owning_user = Some("bob".to_string());
        let orphan = record("40", "7", "cron");
        let records = vec![init, shell, vim, other, orphan];
        Snapshot::build(Platform::Unix, records, Vec::new())
    }

    #[test]
    fn test_lookup_by_pid_prefers_observed() {
        let snapshot = sample();
        assert_eq!(snapshot.by_pid("20").unwrap().name, "bash");
        assert!(snapshot.by_pid("7").unwrap().is_placeholder());
        assert!(snapshot.by_pid("999").is_none());
    }

    #[test]
    fn test_filters() {
        let snapshot = sample();
        assert_eq!(snapshot.by_name("bash").count(), 2);
        assert_eq!(snapshot.by_name("Unknown").count(), 0);
        let vim = snapshot.by_command("/usr/bin/vim").next().unwrap();
        assert_eq!(vim.pid, "21");
        let alice: Vec<&str> = snapshot.by_user("alice").map(|r| r.pid.as_str()).collect();
        assert_eq!(alice, vec!["20", "21"]);
    }

    #[test]
    fn test_parent_and_children() {
        let snapshot = sample();
        let shell = snapshot.by_pid("20").unwrap();
        assert_eq!(snapshot.parent(shell).unwrap().pid, "1");
        let kids: Vec<&str> = snapshot.children(shell).map(|r| r.pid.as_str()).collect();
        assert_eq!(kids, vec!["21"]);
    }

    #[test]
    fn test_render_tree() {
        let snapshot = sample();
        assert_eq!(
            snapshot.render_tree(),
            "Unknown 0\n-init 1\n--bash 20\n---vim 21\n--bash 30\nUnknown 7\n-cron 40\n"
        );
    }

    #[test]
    fn test_process_with_id_miss() {
        let snapshot = sample();
        assert!(matches!(
            snapshot.process_with_id("12345"),
            Err(ProcscopeError::NotFound { .. })
        ));
        assert!(snapshot.process_with_id("0").is_err());
        assert_eq!(snapshot.process_with_id("30").unwrap().name, "bash");
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::build(Platform::Windows, Vec::new(), Vec::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.render_tree(), "");
        assert!(snapshot.current_process().is_err());
    }
}
