//! Storage layer: PDF page sources, segment extraction, run ledger.

mod error;
mod extract;
mod ledger;
mod pages;
mod pdf;

pub use error::StoreError;
pub use extract::{ExtractOptions, MAX_COLLISION_ATTEMPTS, SegmentExtractor};
pub use ledger::RunLedger;
pub use pages::{PageStore, PageWriter};
pub use pdf::PdfDocument;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
