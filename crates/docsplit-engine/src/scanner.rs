//! Windowed boundary scan with overlap rejection.
//!
//! The scanner walks a document in windows of `window_size` pages, asks the
//! classifier for document spans, and accepts spans first come first served:
//! candidates are ordered by start page, shorter spans first, and a candidate
//! touching an already claimed page is rejected. When a window yields at
//! least one accepted span the cursor moves to the page after the highest
//! claimed page; otherwise it moves past the window. The cursor always moves
//! forward, so a document of N pages takes at most N classifier calls.
//!
//! Pages never claimed are grouped into maximal consecutive runs and emitted
//! as `Unorganized` documents.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docsplit_ai::{ClassificationError, Classifier};
use docsplit_core::{
    DocumentArtifact, DocumentSpanCandidate, PageRange, build_window_text, group_consecutive,
};
use docsplit_store::{PageWriter, SegmentExtractor, StoreError};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("classifying {} pages {window}: {cause}", .document.display())]
    Classification {
        document: PathBuf,
        window: PageRange,
        #[source]
        cause: ClassificationError,
    },

    #[error("extracting {} pages {range}: {cause}", .document.display())]
    Extraction {
        document: PathBuf,
        range: PageRange,
        #[source]
        cause: StoreError,
    },

    #[error("opening {}: {cause}", .document.display())]
    Open {
        document: PathBuf,
        #[source]
        cause: StoreError,
    },

    #[error("scan of {} cancelled", .document.display())]
    Cancelled { document: PathBuf },
}

impl ScanError {
    pub fn document(&self) -> &Path {
        match self {
            Self::Classification { document, .. }
            | Self::Extraction { document, .. }
            | Self::Open { document, .. }
            | Self::Cancelled { document } => document,
        }
    }

    /// Pages the failure is about, when it concerns a specific range.
    pub fn range(&self) -> Option<PageRange> {
        match self {
            Self::Classification { window, .. } => Some(*window),
            Self::Extraction { range, .. } => Some(*range),
            Self::Open { .. } | Self::Cancelled { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Some page of the span was already claimed.
    Overlap,
    /// The span leaves the document's page range.
    OutOfDocument,
    /// Every candidate file name was taken.
    NamesExhausted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overlap => "overlaps claimed pages",
            Self::OutOfDocument => "outside the document",
            Self::NamesExhausted => "no free file name",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub candidate: DocumentSpanCandidate,
    pub reason: RejectReason,
    /// Window that proposed the candidate.
    pub window: PageRange,
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Classified documents in acceptance order, then `Unorganized` groups.
    pub artifacts: Vec<DocumentArtifact>,
    /// Maximal runs of pages no span claimed.
    pub unclaimed: Vec<PageRange>,
    /// The same pages, flattened and sorted.
    pub unclaimed_pages: Vec<u32>,
    pub rejections: Vec<Rejection>,
    /// Classifier calls made.
    pub windows: u32,
}

impl ScanOutcome {
    pub fn classified(&self) -> impl Iterator<Item = &DocumentArtifact> {
        self.artifacts.iter().filter(|a| !a.is_unorganized())
    }
}

pub struct BoundaryScanner<'a> {
    classifier: &'a dyn Classifier,
    extractor: Arc<SegmentExtractor>,
    window_size: u32,
    cancel: CancelFlag,
}

impl<'a> BoundaryScanner<'a> {
    /// `window_size` below 1 is treated as 1.
    pub fn new(
        classifier: &'a dyn Classifier,
        extractor: Arc<SegmentExtractor>,
        window_size: u32,
    ) -> Self {
        Self {
            classifier,
            extractor,
            window_size: window_size.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Partition `doc` into documents.
    ///
    /// Extraction runs on the blocking pool. On error, files this scan already
    /// wrote are removed and their names released before returning.
    pub async fn scan(&self, doc: Arc<dyn PageWriter>) -> Result<ScanOutcome, ScanError> {
        let mut outcome = ScanOutcome::default();
        match self.run(&doc, &mut outcome).await {
            Ok(()) => Ok(outcome),
            Err(e) => {
                let extractor = self.extractor.clone();
                let written = std::mem::take(&mut outcome.artifacts);
                if let Err(join) =
                    tokio::task::spawn_blocking(move || extractor.discard(&written)).await
                {
                    warn!(error = %join, "cleanup of partial output failed");
                }
                Err(e)
            }
        }
    }

    async fn extract_blocking<F>(
        &self,
        doc: &Arc<dyn PageWriter>,
        extract: F,
    ) -> Result<DocumentArtifact, StoreError>
    where
        F: FnOnce(&SegmentExtractor, &dyn PageWriter) -> Result<DocumentArtifact, StoreError>
            + Send
            + 'static,
    {
        let extractor = self.extractor.clone();
        let source = doc.source_path().to_path_buf();
        let doc = doc.clone();
        tokio::task::spawn_blocking(move || extract(&*extractor, doc.as_ref()))
            .await
            .unwrap_or_else(|join| Err(worker_lost(&source, join)))
    }

    async fn run(
        &self,
        doc: &Arc<dyn PageWriter>,
        outcome: &mut ScanOutcome,
    ) -> Result<(), ScanError> {
        let document = doc.source_path().to_path_buf();
        let total = doc.page_count();
        // Index 0 unused so page numbers index directly.
        let mut claimed = vec![false; total as usize + 1];
        let mut max_claimed = 0u32;
        let mut current = 1u32;

        debug!(
            document = %document.display(),
            pages = total,
            window_size = self.window_size,
            classifier = self.classifier.name(),
            "scan started"
        );

        while current <= total {
            if self.cancel.is_cancelled() {
                info!(document = %document.display(), page = current, "scan cancelled");
                return Err(ScanError::Cancelled { document });
            }

            let last = current.saturating_add(self.window_size - 1).min(total);
            let window = PageRange::new(current, last);
            let texts: Vec<(u32, String)> = window.pages().map(|p| (p, doc.text(p))).collect();
            let text = build_window_text(texts.iter().map(|(p, t)| (*p, t.as_str())));

            outcome.windows += 1;
            let mut candidates = self.classifier.classify(&text).await.map_err(|cause| {
                ScanError::Classification {
                    document: document.clone(),
                    window,
                    cause,
                }
            })?;
            debug!(window = %window, candidates = candidates.len(), "window classified");

            // Stable: equal keys keep the classifier's order.
            candidates.sort_by_key(|c| (c.page_start, c.page_end));

            let mut accepted_any = false;
            for candidate in candidates {
                let range = candidate.range();
                let reason = if !range.fits(total) {
                    Some(RejectReason::OutOfDocument)
                } else if range.pages().any(|p| claimed[p as usize]) {
                    Some(RejectReason::Overlap)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    outcome.reject(candidate, reason, window);
                    continue;
                }

                let span = candidate.clone();
                let extracted = self
                    .extract_blocking(doc, move |extractor, doc| extractor.extract(doc, &span))
                    .await;
                match extracted {
                    Ok(artifact) => {
                        for p in range.pages() {
                            claimed[p as usize] = true;
                        }
                        max_claimed = max_claimed.max(range.end);
                        accepted_any = true;
                        info!(
                            document_type = %artifact.document_type,
                            pages = %range,
                            confidence = artifact.confidence,
                            filename = %artifact.filename,
                            "accepted document"
                        );
                        outcome.artifacts.push(artifact);
                    }
                    Err(StoreError::CollisionExhausted { path, .. }) => {
                        warn!(
                            path = %path.display(),
                            pages = %range,
                            "file names exhausted, leaving pages unclaimed"
                        );
                        outcome.reject(candidate, RejectReason::NamesExhausted, window);
                    }
                    Err(cause) => {
                        return Err(ScanError::Extraction {
                            document,
                            range,
                            cause,
                        });
                    }
                }
            }

            current = if accepted_any {
                (max_claimed + 1).max(current + 1)
            } else {
                window.end + 1
            };
        }

        outcome.unclaimed_pages = (1..=total).filter(|&p| !claimed[p as usize]).collect();
        outcome.unclaimed = group_consecutive(outcome.unclaimed_pages.iter().copied());

        for &range in &outcome.unclaimed {
            let extracted = self
                .extract_blocking(doc, move |extractor, doc| {
                    extractor.extract_unorganized(doc, range)
                })
                .await;
            match extracted {
                Ok(artifact) => outcome.artifacts.push(artifact),
                Err(StoreError::CollisionExhausted { path, .. }) => {
                    warn!(
                        path = %path.display(),
                        pages = %range,
                        "file names exhausted for unorganized pages"
                    );
                }
                Err(cause) => {
                    return Err(ScanError::Extraction {
                        document,
                        range,
                        cause,
                    });
                }
            }
        }

        info!(
            document = %document.display(),
            pages = total,
            documents = outcome.classified().count(),
            unclaimed = outcome.unclaimed_pages.len(),
            rejected = outcome.rejections.len(),
            windows = outcome.windows,
            "scan finished"
        );
        Ok(())
    }
}

impl ScanOutcome {
    fn reject(
        &mut self,
        candidate: DocumentSpanCandidate,
        reason: RejectReason,
        window: PageRange,
    ) {
        info!(
            document_type = %candidate.document_type,
            pages = %candidate.range(),
            window = %window,
            %reason,
            "rejected candidate"
        );
        self.rejections.push(Rejection {
            candidate,
            reason,
            window,
        });
    }
}

/// A blocking store task that panicked or was cancelled.
pub(crate) fn worker_lost(path: &Path, join: JoinError) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(join.to_string()),
    }
}
