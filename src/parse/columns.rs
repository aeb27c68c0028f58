//! Fixed-width table parsing (`ps -o ...` style output)
//!
//! Column boundaries are discovered from the header row. `ps` right-aligns
//! numeric columns and left-aligns text, so a boundary depends on the
//! alignment of the two columns it separates:
//!
//! ```text
//!     PID RUSER       VSZ   RSS                  STARTED UCOMM
//!       1 root     167744 13000 Sun Oct 18 20:33:01 2026 systemd
//! ```
//!
//! The last column always absorbs the remainder of the line.

use super::{numbered_lines, FieldMap, ParseOutcome, RowParseFailure};
use tracing::warn;

/// Headers `ps` prints right-aligned over right-aligned values
const RIGHT_ALIGNED_HEADERS: &[&str] = &[
    "PID", "PPID", "PGID", "SID", "VSZ", "RSS", "%CPU", "%MEM", "NI", "PRI", "STARTED", "TIME",
    "ELAPSED", "MINFLT", "MAJFLT", "NLWP",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
}

impl Alignment {
    fn for_header(name: &str) -> Self {
        if RIGHT_ALIGNED_HEADERS.contains(&name) {
            Alignment::Right
        } else {
            Alignment::Left
        }
    }
}

/// One header token and its character span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub alignment: Alignment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
}

impl ColumnLayout {
    /// Build the layout from a header line, `None` if it has no tokens
    pub fn from_header(header: &str) -> Option<Self> {
        let mut columns: Vec<Column> = Vec::new();
        let mut token_start = None;
        let chars: Vec<char> = header.chars().collect();

        for (idx, ch) in chars.iter().chain(std::iter::once(&' ')).enumerate() {
            match (ch.is_whitespace(), token_start) {
                (false, None) => token_start = Some(idx),
                (true, Some(start)) => {
                    let raw: String = chars[start..idx].iter().collect();
                    let name = unique_name(&columns, raw);
                    columns.push(Column {
                        alignment: Alignment::for_header(&name),
                        name,
                        start,
                        end: idx,
                    });
                    token_start = None;
                }
                _ => {}
            }
        }

        if columns.is_empty() {
            None
        } else {
            Some(Self { columns })
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Slice a data line into one trimmed value per column
    pub fn slice_row(&self, line: &str) -> Result<Vec<String>, String> {
        let chars: Vec<char> = line.chars().collect();
        let len = chars.len();
        let cols = &self.columns;

        let mut starts = Vec::with_capacity(cols.len());
        starts.push(0);
        for pair in cols.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let lower = *starts.last().unwrap_or(&0);
            let boundary = match (current.alignment, next.alignment) {
                (_, Alignment::Left) => next.start,
                (Alignment::Right, Alignment::Right) => current.end,
                (Alignment::Left, Alignment::Right) => {
                    split_before_last_run(&chars, lower, next.start, next.end.min(len))
                }
            };
            starts.push(boundary.max(lower));
        }

        let last_start = *starts.last().unwrap_or(&0);
        if len < last_start {
            let last = &cols[cols.len() - 1];
            return Err(format!(
                "row has {} characters but column {} starts at {}",
                len, last.name, last_start
            ));
        }

        let mut values = Vec::with_capacity(cols.len());
        for (idx, start) in starts.iter().enumerate() {
            let end = starts.get(idx + 1).copied().unwrap_or(len);
            let value: String = chars[*start..end].iter().collect();
            values.push(value.trim().to_string());
        }
        Ok(values)
    }

    fn to_field_map(&self, values: Vec<String>) -> FieldMap {
        self.columns
            .iter()
            .map(|col| col.name.clone())
            .zip(values)
            .collect()
    }
}

/// Parse a fixed-width capture; the first non-blank line is the header
pub fn parse(raw: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut lines = numbered_lines(raw).filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return outcome;
    };
    let Some(layout) = ColumnLayout::from_header(header) else {
        return outcome;
    };

    for (line_no, line) in lines {
        match layout.slice_row(line) {
            Ok(values) => outcome.rows.push(layout.to_field_map(values)),
            Err(reason) => {
                warn!(line = line_no, %reason, "skipping unparsable row");
                outcome.failures.push(RowParseFailure {
                    line: line_no,
                    reason,
                    raw: line.to_string(),
                });
            }
        }
    }

    outcome
}

/// Where a right-aligned column begins when it follows a left-aligned one
///
/// The right-aligned value is the last whitespace-delimited run that ends
/// at or after `header`, the column's header start. If no such run exists
/// the column is empty and the boundary falls on `header`.
fn split_before_last_run(chars: &[char], lower: usize, header: usize, upper: usize) -> usize {
    let mut end = upper;
    while end > lower && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if end <= header {
        return header;
    }

    let mut start = end;
    while start > lower && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    start
}

fn unique_name(existing: &[Column], raw: String) -> String {
    if !existing.iter().any(|col| col.name == raw) {
        return raw;
    }
    (2..)
        .map(|n| format!("{}_{}", raw, n))
        .find(|candidate| !existing.iter().any(|col| &col.name == candidate))
        .unwrap_or(raw)
}
