//! Repeating `Key=Value` block parsing (`wmic ... /VALUE` style output)

use super::{numbered_lines, FieldMap, ParseOutcome, RowParseFailure};
use std::collections::BTreeSet;
use tracing::warn;

/// Block parser for a known, fixed field set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueBlocks {
    fields: Vec<String>,
    separator: char,
}

impl KeyValueBlocks {
    pub fn new<I, S>(fields: I, separator: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            separator,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Split a capture into one map per block
    ///
    /// A block ends at a blank line, when it holds as many keys as the field
    /// set, or when a key already present in it shows up again. Blocks whose
    /// keys do not match the field set are reported and dropped, so a process
    /// missing a field never gets merged with its neighbour.
    pub fn parse(&self, raw: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut block = Block::default();

        for (line_no, line) in numbered_lines(raw) {
            let line = line.trim();
            if line.is_empty() {
                if !block.lines.is_empty() {
                    self.finish(std::mem::take(&mut block), &mut outcome);
                }
                continue;
            }

            let Some((key, value)) = line.split_once(self.separator) else {
                block.start_at(line_no);
                block.lines.push(line.to_string());
                block.malformed = Some(format!(
                    "line {} has no '{}' separator",
                    line_no, self.separator
                ));
                continue;
            };
            let key = key.trim();

            if block.fields.contains_key(key) {
                self.finish(std::mem::take(&mut block), &mut outcome);
            }

            block.start_at(line_no);
            block.lines.push(line.to_string());
            block.fields.insert(key.to_string(), value.trim().to_string());

            if block.fields.len() == self.fields.len() {
                self.finish(std::mem::take(&mut block), &mut outcome);
            }
        }

        if !block.lines.is_empty() {
            self.finish(block, &mut outcome);
        }

        outcome
    }

    fn finish(&self, block: Block, outcome: &mut ParseOutcome) {
        match self.validate(&block) {
            Ok(()) => outcome.rows.push(block.fields),
            Err(reason) => {
                warn!(line = block.first_line, %reason, "skipping malformed block");
                outcome.failures.push(RowParseFailure {
                    line: block.first_line,
                    reason,
                    raw: block.lines.join("\n"),
                });
            }
        }
    }

    fn validate(&self, block: &Block) -> Result<(), String> {
        if let Some(reason) = &block.malformed {
            return Err(reason.clone());
        }

        let expected: BTreeSet<&str> = self.fields.iter().map(String::as_str).collect();
        let found: BTreeSet<&str> = block.fields.keys().map(String::as_str).collect();
        if expected == found {
            return Ok(());
        }

        let missing: Vec<&str> = expected.difference(&found).copied().collect();
        let unexpected: Vec<&str> = found.difference(&expected).copied().collect();
        let mut reason = format!(
            "block has {} of {} expected fields",
            block.fields.len(),
            self.fields.len()
        );
        if !missing.is_empty() {
            reason.push_str(&format!(", missing {}", missing.join(", ")));
        }
        if !unexpected.is_empty() {
            reason.push_str(&format!(", unexpected {}", unexpected.join(", ")));
        }
        Err(reason)
    }
}

#[derive(Debug, Default)]
struct Block {
    first_line: usize,
    lines: Vec<String>,
    fields: FieldMap,
    malformed: Option<String>,
}

impl Block {
    fn start_at(&mut self, line_no: usize) {
        if self.lines.is_empty() {
            self.first_line = line_no;
        }
    }
}
