//! The span-classifier contract.
//!
//! A classifier sees one window of page-tagged text (see
//! [`docsplit_core::window`]) and proposes zero or more document spans in
//! absolute page numbers. It never resolves overlaps; that is the scanner's
//! job.

use async_trait::async_trait;
use docsplit_core::DocumentSpanCandidate;
use serde::Deserialize;
use thiserror::Error;

use crate::taxonomy::Taxonomy;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("malformed classifier response: {0}")]
    Malformed(String),

    #[error("document type {0:?} is not in the taxonomy")]
    UnknownType(String),

    #[error("confidence {value} for {document_type:?} is outside [0, 1]")]
    ConfidenceOutOfRange { document_type: String, value: f32 },

    #[error("invalid page span {start}-{end}")]
    InvalidSpan { start: u32, end: u32 },

    #[cfg(feature = "llm")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Proposes document spans for one window of page-tagged text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        window: &str,
    ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError>;

    /// Short strategy name for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Wraps any classifier and rejects output outside the taxonomy contract.
///
/// Candidates are checked as a whole: one bad candidate fails the window.
pub struct TaxonomyGuard<C> {
    inner: C,
    taxonomy: Taxonomy,
}

impl<C: Classifier> TaxonomyGuard<C> {
    pub fn new(inner: C, taxonomy: Taxonomy) -> Self {
        Self { inner, taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }
}

#[async_trait]
impl<C: Classifier> Classifier for TaxonomyGuard<C> {
    async fn classify(
        &self,
        window: &str,
    ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
        let candidates = self.inner.classify(window).await?;
        validate_candidates(&candidates, &self.taxonomy)?;
        Ok(candidates)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Check confidence bounds, taxonomy membership and span shape.
pub fn validate_candidates(
    candidates: &[DocumentSpanCandidate],
    taxonomy: &Taxonomy,
) -> Result<(), ClassificationError> {
    for c in candidates {
        if !(0.0..=1.0).contains(&c.confidence) {
            return Err(ClassificationError::ConfidenceOutOfRange {
                document_type: c.document_type.clone(),
                value: c.confidence,
            });
        }
        if !taxonomy.contains(&c.document_type) {
            return Err(ClassificationError::UnknownType(c.document_type.clone()));
        }
        if c.page_start == 0 || c.page_start > c.page_end {
            return Err(ClassificationError::InvalidSpan {
                start: c.page_start,
                end: c.page_end,
            });
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Wrapped { documents: Vec<DocumentSpanCandidate> },
    Bare(Vec<DocumentSpanCandidate>),
}

/// Parse a classifier's JSON reply.
///
/// Accepts `{"documents": [...]}` or a bare array, optionally wrapped in a
/// markdown code fence. Empty suggested filenames are dropped.
pub fn parse_candidates(content: &str) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
    let json = strip_code_fence(content);
    let reply: Reply = serde_json::from_str(json).map_err(|e| {
        ClassificationError::Malformed(format!(
            "{e}; raw: {}",
            truncate_chars(json, 200)
        ))
    })?;

    let mut candidates = match reply {
        Reply::Wrapped { documents } => documents,
        Reply::Bare(documents) => documents,
    };
    for c in &mut candidates {
        if c.suggested_filename
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            c.suggested_filename = None;
        }
    }
    Ok(candidates)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsplit_core::PageRange;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec!["Will".into(), "Deed".into()]).unwrap()
    }

    struct Fixed(Vec<DocumentSpanCandidate>);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(
            &self,
            _window: &str,
        ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn parses_wrapped_documents() {
        let reply = r#"{"documents": [
            {"document_type": "Will", "confidence": 0.9, "page_start": 1, "page_end": 3,
             "suggested_filename": "smith_will.pdf"},
            {"document_type": "Deed", "confidence": 0.7, "page_start": 4, "page_end": 4}
        ]}"#;
        let candidates = parse_candidates(reply).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].range(), PageRange::new(1, 3));
        assert_eq!(candidates[0].suggested_filename.as_deref(), Some("smith_will.pdf"));
        assert!(candidates[1].suggested_filename.is_none());
    }

    #[test]
    fn parses_bare_array_in_code_fence() {
        let reply = "```json\n[{\"document_type\": \"Deed\", \"confidence\": 1.0, \"page_start\": 2, \"page_end\": 5, \"suggested_filename\": \"\"}]\n```";
        let candidates = parse_candidates(reply).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document_type, "Deed");
        assert!(candidates[0].suggested_filename.is_none());
    }

    #[test]
    fn parses_empty_documents() {
        assert!(parse_candidates(r#"{"documents": []}"#).unwrap().is_empty());
    }

    #[test]
    fn rejects_prose() {
        let err = parse_candidates("I think pages 1-3 are a will.").unwrap_err();
        assert!(matches!(err, ClassificationError::Malformed(_)));
    }

    #[test]
    fn rejects_negative_page() {
        let reply = r#"[{"document_type": "Will", "confidence": 0.5, "page_start": -1, "page_end": 2}]"#;
        assert!(matches!(
            parse_candidates(reply),
            Err(ClassificationError::Malformed(_))
        ));
    }

    #[test]
    fn validate_rejects_confidence_out_of_range() {
        let c = DocumentSpanCandidate::new("Will", 1.2, PageRange::new(1, 1));
        let err = validate_candidates(&[c], &taxonomy()).unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::ConfidenceOutOfRange { value, .. } if value > 1.0
        ));
    }

    #[test]
    fn validate_rejects_nan_confidence() {
        let c = DocumentSpanCandidate::new("Will", f32::NAN, PageRange::new(1, 1));
        assert!(validate_candidates(&[c], &taxonomy()).is_err());
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let c = DocumentSpanCandidate::new("Recipe", 0.9, PageRange::new(1, 1));
        let err = validate_candidates(&[c], &taxonomy()).unwrap_err();
        assert!(matches!(err, ClassificationError::UnknownType(t) if t == "Recipe"));
    }

    #[test]
    fn validate_rejects_inverted_span() {
        let c = DocumentSpanCandidate::new("Will", 0.9, PageRange::new(4, 2));
        assert!(matches!(
            validate_candidates(&[c], &taxonomy()),
            Err(ClassificationError::InvalidSpan { start: 4, end: 2 })
        ));
    }

    #[tokio::test]
    async fn guard_passes_valid_output() {
        let inner = Fixed(vec![DocumentSpanCandidate::new("Deed", 0.8, PageRange::new(1, 2))]);
        let guard = TaxonomyGuard::new(inner, taxonomy());
        assert_eq!(guard.classify("[PAGE 1]\n").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn guard_fails_whole_window_on_one_bad_candidate() {
        let inner = Fixed(vec![
            DocumentSpanCandidate::new("Deed", 0.8, PageRange::new(1, 2)),
            DocumentSpanCandidate::new("Invoice", 0.8, PageRange::new(3, 3)),
        ]);
        let guard = TaxonomyGuard::new(inner, taxonomy());
        assert!(matches!(
            guard.classify("[PAGE 1]\n").await,
            Err(ClassificationError::UnknownType(_))
        ));
    }
}
