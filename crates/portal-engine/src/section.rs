//! Anchor-bounded line lists.
//!
//! Overlay and attribute lists render as loose text blocks under a heading
//! rather than as tables. A section runs from just after the first start
//! anchor to the earliest following end anchor (or the end of the text).

use crate::Result;
use regex::{Regex, RegexBuilder};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SectionScanner {
    start: Regex,
    ends: Vec<Regex>,
    exclusions: Vec<String>,
    min_line_len: usize,
}

fn pattern(p: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(p).case_insensitive(true).build()?)
}

impl SectionScanner {
    /// Anchors are case-insensitive regular expressions.
    pub fn new(start: &str) -> Result<Self> {
        Ok(Self {
            start: pattern(start)?,
            ends: Vec::new(),
            exclusions: Vec::new(),
            min_line_len: 1,
        })
    }

    pub fn end_anchor(mut self, end: &str) -> Result<Self> {
        self.ends.push(pattern(end)?);
        Ok(self)
    }

    pub fn end_anchors<S: AsRef<str>>(mut self, ends: &[S]) -> Result<Self> {
        for end in ends {
            self.ends.push(pattern(end.as_ref())?);
        }
        Ok(self)
    }

    /// Drop lines containing any of these substrings (case-insensitive).
    pub fn exclude<S: AsRef<str>>(mut self, exclusions: &[S]) -> Self {
        self.exclusions
            .extend(exclusions.iter().map(|e| e.as_ref().to_lowercase()));
        self
    }

    /// Drop lines with fewer characters than this.
    pub fn min_line_len(mut self, len: usize) -> Self {
        self.min_line_len = len.max(1);
        self
    }

    /// The raw section text, if the start anchor occurs.
    pub fn isolate<'t>(&self, text: &'t str) -> Option<&'t str> {
        let begin = self.start.find(text)?.end();
        let rest = &text[begin..];
        let end = self
            .ends
            .iter()
            .filter_map(|re| re.find(rest).map(|m| m.start()))
            .min()
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }

    /// Trimmed, filtered, deduplicated lines of the section in page order.
    pub fn scan(&self, text: &str) -> Vec<String> {
        let Some(section) = self.isolate(text) else {
            debug!("section start /{}/ not found", self.start.as_str());
            return Vec::new();
        };

        let mut lines: Vec<String> = Vec::new();
        for line in section.lines().map(str::trim) {
            if line.chars().count() < self.min_line_len {
                continue;
            }
            let lower = line.to_lowercase();
            if self.exclusions.iter().any(|ex| lower.contains(ex.as_str())) {
                continue;
            }
            if !lines.iter().any(|seen| seen == line) {
                lines.push(line.to_string());
            }
        }
        lines
    }
}
