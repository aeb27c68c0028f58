//! Parent/child graph assembly
//!
//! Records live in a flat arena; relationships are [`RecordHandle`]s into
//! it. Parents that are not part of the listing (already exited, filtered
//! out) are represented by one shared placeholder record per missing pid.

use crate::record::{ProcessRecord, RecordHandle};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Link every record to its parent, appending placeholders as needed
///
/// The pid index is built once over the observed records and never sees the
/// placeholders, which are tracked separately so that orphans sharing a
/// missing parent share its placeholder. After linking, the arena is a
/// forest: every record is reachable from exactly one parentless root.
pub fn build(records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
    let mut arena = records;
    let observed = arena.len();

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in arena.iter().enumerate() {
        index.entry(record.pid.clone()).or_default().push(idx);
    }

    let mut placeholders: HashMap<String, usize> = HashMap::new();

    for child in 0..observed {
        let parent_pid = arena[child].parent_pid.clone();
        if parent_pid.is_empty() {
            continue;
        }

        // A process never parents itself, even when it reports its own pid.
        let found = if parent_pid == arena[child].pid {
            None
        } else {
            index
                .get(&parent_pid)
                .and_then(|candidates| candidates.first().copied())
        };

        let parent = match found {
            Some(parent) => parent,
            None => placeholder_for(&mut arena, &mut placeholders, &parent_pid),
        };
        link(&mut arena, parent, child);
    }

    break_cycles(&mut arena, &mut placeholders);

    debug!(
        observed,
        placeholders = arena.len() - observed,
        "process graph assembled"
    );
    arena
}

fn placeholder_for(
    arena: &mut Vec<ProcessRecord>,
    placeholders: &mut HashMap<String, usize>,
    pid: &str,
) -> usize {
    if let Some(&idx) = placeholders.get(pid) {
        return idx;
    }
    arena.push(ProcessRecord::placeholder(pid));
    let idx = arena.len() - 1;
    placeholders.insert(pid.to_string(), idx);
    idx
}

fn link(arena: &mut [ProcessRecord], parent: usize, child: usize) {
    arena[child].parent = Some(RecordHandle(parent));
    arena[parent].children.push(RecordHandle(child));
}

/// Re-root records caught in parent cycles
///
/// Pid reuse can make two live processes name each other as parent. Such
/// records are unreachable from any root; each cycle is cut by moving its
/// first member under a placeholder for its parent pid.
fn break_cycles(arena: &mut Vec<ProcessRecord>, placeholders: &mut HashMap<String, usize>) {
    loop {
        let reached = reachable(arena);
        let Some(stranded) = reached.iter().position(|seen| !seen) else {
            return;
        };

        let parent_pid = arena[stranded].parent_pid.clone();
        warn!(
            pid = %arena[stranded].pid,
            parent_pid = %parent_pid,
            "parent cycle detected, re-rooting under placeholder"
        );

        if let Some(old) = arena[stranded].parent.take() {
            arena[old.0].children.retain(|child| child.0 != stranded);
        }
        let placeholder = placeholder_for(arena, placeholders, &parent_pid);
        link(arena, placeholder, stranded);
    }
}

fn reachable(arena: &[ProcessRecord]) -> Vec<bool> {
    let mut seen = vec![false; arena.len()];
    let mut stack: Vec<usize> = arena
        .iter()
        .enumerate()
        .filter(|(_, record)| record.parent.is_none())
        .map(|(idx, _)| idx)
        .collect();

    while let Some(idx) = stack.pop() {
        if std::mem::replace(&mut seen[idx], true) {
            continue;
        }
        stack.extend(arena[idx].children.iter().map(|child| child.0));
    }
    seen
}
