//! Output artifacts and the persisted run record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::span::PageRange;

/// Document type assigned to pages no classifier span claimed.
pub const UNORGANIZED: &str = "Unorganized";

/// One finished output document and where it came from.
///
/// Field order and serialized names are the sidecar format consumed by
/// downstream tooling; keep them stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentArtifact {
    #[serde(rename = "source")]
    pub source_document: PathBuf,
    pub start_page: u32,
    pub end_page: u32,
    #[serde(rename = "type")]
    pub document_type: String,
    pub filename: String,
    pub confidence: f32,
    /// `None` in dry-run mode.
    pub output_path: Option<PathBuf>,
}

impl DocumentArtifact {
    pub fn range(&self) -> PageRange {
        PageRange::new(self.start_page, self.end_page)
    }

    pub fn is_unorganized(&self) -> bool {
        self.document_type == UNORGANIZED
    }
}

/// Sidecar written at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub documents: Vec<DocumentArtifact>,
    /// Source identifier → sorted page numbers never extracted as a classified span.
    pub unprocessed_pages: BTreeMap<String, Vec<u32>>,
}

impl RunRecord {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.unprocessed_pages.is_empty()
    }
}
