//! Page ranges and classifier-proposed document spans.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// An inclusive, 1-based range of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }

    /// Number of pages covered. Zero for an inverted range.
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn pages(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn contains(&self, page: u32) -> bool {
        self.start <= page && page <= self.end
    }

    /// `true` when `1 <= start <= end <= total`.
    pub fn fits(&self, total: u32) -> bool {
        self.start >= 1 && !self.is_empty() && self.end <= total
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A document span proposed by a classifier for one window.
///
/// Page numbers are absolute positions in the source document, not offsets
/// into the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpanCandidate {
    pub document_type: String,
    pub confidence: f32,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_filename: Option<String>,
}

impl DocumentSpanCandidate {
    pub fn new(document_type: impl Into<String>, confidence: f32, range: PageRange) -> Self {
        Self {
            document_type: document_type.into(),
            confidence,
            page_start: range.start,
            page_end: range.end,
            suggested_filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.suggested_filename = Some(filename.into());
        self
    }

    pub fn range(&self) -> PageRange {
        PageRange::new(self.page_start, self.page_end)
    }
}

/// Collapse ascending, de-duplicated page numbers into maximal consecutive runs.
///
/// `[1, 2, 3, 7, 9, 10]` → `[1-3, 7-7, 9-10]`
pub fn group_consecutive(pages: impl IntoIterator<Item = u32>) -> Vec<PageRange> {
    let mut groups: Vec<PageRange> = Vec::new();
    for page in pages {
        match groups.last_mut() {
            Some(last) if last.end + 1 == page => last.end = page,
            _ => groups.push(PageRange::single(page)),
        }
    }
    groups
}
