//! Raw capture parsing
//!
//! Turns the text printed by a listing tool into one [`FieldMap`] per
//! process. No value is interpreted here; that is the normalizer's job.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub mod blocks;
pub mod columns;

pub use blocks::KeyValueBlocks;
pub use columns::{Alignment, Column, ColumnLayout};

/// Raw field name to raw value, one per observed process
pub type FieldMap = BTreeMap<String, String>;

/// A row or block that had to be skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowParseFailure {
    /// 1-based line number in the capture (first line of the block)
    pub line: usize,
    pub reason: String,
    pub raw: String,
}

impl fmt::Display for RowParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line, self.reason, self.raw)
    }
}

/// Rows extracted from one capture, plus the ones that were skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub rows: Vec<FieldMap>,
    pub failures: Vec<RowParseFailure>,
}

/// How a capture is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Header row followed by one aligned line per process (`ps`)
    FixedWidth,
    /// Repeating `Key<sep>Value` lines, one full field set per process (`wmic /VALUE`)
    KeyValueBlocks(KeyValueBlocks),
}

impl ParseStrategy {
    pub fn key_value<I, S>(fields: I, separator: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParseStrategy::KeyValueBlocks(KeyValueBlocks::new(fields, separator))
    }

    pub fn parse(&self, raw: &str) -> ParseOutcome {
        match self {
            ParseStrategy::FixedWidth => columns::parse(raw),
            ParseStrategy::KeyValueBlocks(blocks) => blocks.parse(raw),
        }
    }
}

/// Lines of a capture paired with their 1-based line number
pub(crate) fn numbered_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
}
