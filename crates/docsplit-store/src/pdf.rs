//! lopdf-backed page source.

use std::path::{Path, PathBuf};

use docsplit_core::PageRange;
use lopdf::{Document, ObjectId};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::pages::{PageStore, PageWriter};

/// A PDF loaded into memory.
///
/// The source file is only ever read. Blank-page removal and subset writing
/// operate on the in-memory copy.
pub struct PdfDocument {
    path: PathBuf,
    doc: Document,
    /// Extracted text per page, index 0 is page 1.
    texts: Vec<String>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let doc = Document::load(path).map_err(|e| StoreError::pdf(path, e))?;
        Ok(Self::from_document(path, doc))
    }

    /// Load from bytes already in memory; `path` is recorded as the source.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = Document::load_mem(bytes).map_err(|e| StoreError::pdf(&path, e))?;
        Ok(Self::from_document(&path, doc))
    }

    fn from_document(path: &Path, doc: Document) -> Self {
        let texts = doc
            .get_pages()
            .keys()
            .map(|&page| match doc.extract_text(&[page]) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        page,
                        error = %e,
                        "text extraction failed, treating page as empty"
                    );
                    String::new()
                }
            })
            .collect::<Vec<_>>();

        debug!(path = %path.display(), pages = texts.len(), "opened pdf");
        Self {
            path: path.to_path_buf(),
            doc,
            texts,
        }
    }

    /// Page numbers with no text and no drawn XObject.
    pub fn blank_pages(&self) -> Vec<u32> {
        self.doc
            .get_pages()
            .into_iter()
            .filter(|&(page, id)| {
                let text = self.texts.get(page as usize - 1).map_or("", String::as_str);
                text.trim().is_empty() && !self.draws_xobject(id)
            })
            .map(|(page, _)| page)
            .collect()
    }

    fn draws_xobject(&self, page_id: ObjectId) -> bool {
        match self.doc.get_and_decode_page_content(page_id) {
            Ok(content) => content.operations.iter().any(|op| op.operator == "Do"),
            // Undecodable content is kept rather than guessed blank.
            Err(_) => true,
        }
    }

    /// Drop blank pages from the in-memory copy.
    ///
    /// Returns the removed pages in their original numbering. Pages after a
    /// removed page are renumbered.
    pub fn remove_blank_pages(&mut self) -> Vec<u32> {
        let blank = self.blank_pages();
        if blank.is_empty() {
            return blank;
        }

        self.doc.delete_pages(&blank);
        for &page in blank.iter().rev() {
            self.texts.remove(page as usize - 1);
        }

        info!(
            path = %self.path.display(),
            removed = ?blank,
            remaining = self.texts.len(),
            "removed blank pages"
        );
        blank
    }
}

impl PageStore for PdfDocument {
    fn page_count(&self) -> u32 {
        self.texts.len() as u32
    }

    fn text(&self, page: u32) -> String {
        page.checked_sub(1)
            .and_then(|i| self.texts.get(i as usize))
            .cloned()
            .unwrap_or_default()
    }
}

impl PageWriter for PdfDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn write_subset(&self, range: PageRange) -> Result<Vec<u8>, StoreError> {
        let total = self.page_count();
        if !range.fits(total) {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                total,
            });
        }

        let outside: Vec<u32> = (1..=total).filter(|&p| !range.contains(p)).collect();
        let mut subset = self.doc.clone();
        subset.delete_pages(&outside);
        subset.prune_objects();
        subset.renumber_objects();
        subset.compress();

        let mut bytes = Vec::new();
        subset
            .save_to(&mut bytes)
            .map_err(|e| StoreError::pdf(&self.path, lopdf::Error::from(e)))?;
        Ok(bytes)
    }
}
