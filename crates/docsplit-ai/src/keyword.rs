//! Offline keyword classifier.
//!
//! A page opens a document when it mentions a keyword of some category.
//! Following pages belong to that document until a page opens a different
//! category. Pages before the first opening page are left unclaimed.

use async_trait::async_trait;
use docsplit_core::{DocumentSpanCandidate, PageRange, split_window_text};
use tracing::debug;

use crate::classifier::{ClassificationError, Classifier};
use crate::taxonomy::Taxonomy;

pub struct KeywordClassifier {
    /// (category, lowercase keywords) in taxonomy order; first match wins.
    rules: Vec<(String, Vec<String>)>,
}

struct OpenSpan {
    category: String,
    range: PageRange,
    matched: u32,
}

impl KeywordClassifier {
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let rules = taxonomy
            .categories()
            .iter()
            .map(|c| (c.clone(), taxonomy.keywords(c)))
            .collect();
        Self { rules }
    }

    fn match_page(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map(|(category, _)| category.as_str())
    }

    fn spans(&self, window: &str) -> Vec<DocumentSpanCandidate> {
        let mut spans: Vec<OpenSpan> = Vec::new();

        for (page, text) in split_window_text(window) {
            match (self.match_page(text), spans.last_mut()) {
                (Some(category), Some(open)) if open.category == category => {
                    open.range.end = page;
                    open.matched += 1;
                }
                (Some(category), _) => spans.push(OpenSpan {
                    category: category.to_string(),
                    range: PageRange::single(page),
                    matched: 1,
                }),
                (None, Some(open)) => open.range.end = page,
                (None, None) => {}
            }
        }

        spans
            .into_iter()
            .map(|s| {
                let confidence = s.matched as f32 / s.range.len() as f32;
                DocumentSpanCandidate::new(s.category, confidence, s.range)
            })
            .collect()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        window: &str,
    ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
        let spans = self.spans(window);
        debug!(spans = spans.len(), "keyword classification");
        Ok(spans)
    }

    fn name(&self) -> &str {
        "keywords"
    }
}
