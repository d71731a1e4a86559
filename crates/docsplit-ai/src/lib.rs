//! Classification layer: the span-classifier contract and its strategies.

mod classifier;
mod keyword;
mod taxonomy;

pub use classifier::{
    ClassificationError, Classifier, TaxonomyGuard, parse_candidates, validate_candidates,
};
pub use keyword::KeywordClassifier;
pub use taxonomy::{Taxonomy, TaxonomyError};

#[cfg(feature = "llm")]
mod llm;
#[cfg(feature = "llm")]
pub use llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmClassifier};
