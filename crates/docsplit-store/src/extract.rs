//! Segment extraction with collision-safe naming.
//!
//! Output layout is `<root>/<document type>/<file name>`. A name counts as
//! taken when this run already reserved it, or, unless `overwrite` is set,
//! when a file from a previous run sits there. Taken names get `_1`, `_2`, …
//! suffixes before the extension.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use docsplit_core::naming::{
    default_filename, sanitize_component, sanitize_filename, source_stem, unorganized_filename,
    with_suffix,
};
use docsplit_core::{DocumentArtifact, DocumentSpanCandidate, PageRange, UNORGANIZED};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::pages::PageWriter;

/// Suffixes tried before giving up on a name.
pub const MAX_COLLISION_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Replace files left by a previous run.
    pub overwrite: bool,
    /// Resolve names but write nothing.
    pub dry_run: bool,
}

/// Writes accepted spans under one output root.
///
/// Shared by all workers of a run; path reservation is serialized so two
/// workers never resolve to the same file.
pub struct SegmentExtractor {
    root: PathBuf,
    options: ExtractOptions,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl SegmentExtractor {
    pub fn new(root: impl Into<PathBuf>, options: ExtractOptions) -> Self {
        Self {
            root: root.into(),
            options,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }

    /// Create the output root and `Unorganized/`. Nothing is created in dry-run.
    pub fn prepare(&self) -> Result<(), StoreError> {
        if self.options.dry_run {
            return Ok(());
        }
        let unorganized = self.root.join(UNORGANIZED);
        std::fs::create_dir_all(&unorganized).map_err(|e| StoreError::io(&unorganized, e))
    }

    /// Materialize a classified span.
    pub fn extract(
        &self,
        doc: &dyn PageWriter,
        span: &DocumentSpanCandidate,
    ) -> Result<DocumentArtifact, StoreError> {
        let range = span.range();
        let filename = match span.suggested_filename.as_deref() {
            Some(name) => sanitize_filename(name),
            None => default_filename(&source_stem(doc.source_path()), range),
        };
        self.materialize(doc, range, &span.document_type, filename, span.confidence)
    }

    /// Materialize a group of unclaimed pages as an `Unorganized` document.
    pub fn extract_unorganized(
        &self,
        doc: &dyn PageWriter,
        range: PageRange,
    ) -> Result<DocumentArtifact, StoreError> {
        self.materialize(doc, range, UNORGANIZED, unorganized_filename(range), 1.0)
    }

    fn materialize(
        &self,
        doc: &dyn PageWriter,
        range: PageRange,
        document_type: &str,
        filename: String,
        confidence: f32,
    ) -> Result<DocumentArtifact, StoreError> {
        let total = doc.page_count();
        if !range.fits(total) {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                total,
            });
        }

        let dir = self.root.join(sanitize_component(document_type));
        let bytes = if self.options.dry_run {
            None
        } else {
            Some(doc.write_subset(range)?)
        };

        let path = self.reserve(&dir, &filename)?;
        let output_path = match bytes {
            Some(bytes) => {
                if let Err(e) = write_file(&dir, &path, &bytes) {
                    self.release(&path);
                    return Err(e);
                }
                info!(path = %path.display(), pages = %range, "wrote document");
                Some(path.clone())
            }
            None => {
                debug!(path = %path.display(), pages = %range, "dry run, not writing");
                None
            }
        };

        Ok(DocumentArtifact {
            source_document: doc.source_path().to_path_buf(),
            start_page: range.start,
            end_page: range.end,
            document_type: document_type.to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename),
            confidence,
            output_path,
        })
    }

    fn reserve(&self, dir: &Path, filename: &str) -> Result<PathBuf, StoreError> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());

        for attempt in 0..=MAX_COLLISION_ATTEMPTS {
            let name = if attempt == 0 {
                filename.to_string()
            } else {
                with_suffix(filename, attempt)
            };
            let path = dir.join(name);
            let taken = reserved.contains(&path) || (!self.options.overwrite && path.exists());
            if !taken {
                if attempt > 0 {
                    debug!(path = %path.display(), attempt, "resolved name collision");
                }
                reserved.insert(path.clone());
                return Ok(path);
            }
        }

        Err(StoreError::CollisionExhausted {
            path: dir.join(filename),
            attempts: MAX_COLLISION_ATTEMPTS,
        })
    }

    /// Undo earlier extractions: delete the files they wrote and free their
    /// names for later sources in the same run. Removal is best effort.
    pub fn discard(&self, artifacts: &[DocumentArtifact]) {
        for artifact in artifacts {
            if let Some(path) = artifact.output_path.as_deref() {
                match std::fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed partial output"),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "could not remove partial output")
                    }
                }
            }
            let reserved = self
                .root
                .join(sanitize_component(&artifact.document_type))
                .join(&artifact.filename);
            self.release(&reserved);
        }
    }

    fn release(&self, path: &Path) {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        reserved.remove(path);
    }
}

fn write_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    std::fs::write(path, bytes).map_err(|e| StoreError::io(path, e))
}
