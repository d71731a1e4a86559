use std::path::Path;

use docsplit_core::PageRange;

use crate::StoreError;

/// Random access to one source document's pages.
///
/// Page numbers are 1-based. `text` never fails for a valid page; a page
/// whose text cannot be extracted reads as empty.
pub trait PageStore: Send + Sync {
    fn page_count(&self) -> u32;

    fn text(&self, page: u32) -> String;
}

/// Page-subset extraction for the same source document.
pub trait PageWriter: PageStore {
    /// Where the document came from; recorded on every artifact.
    fn source_path(&self) -> &Path;

    /// A standalone PDF holding exactly the pages in `range`, content unmodified.
    fn write_subset(&self, range: PageRange) -> Result<Vec<u8>, StoreError>;
}
