//! Document taxonomy loaded from YAML.
//!
//! ```yaml
//! categories:
//!   - Will
//!   - Trust
//!   - Power of Attorney
//! keywords:            # optional, used by the keyword classifier
//!   Will: ["last will", "testament"]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("taxonomy file not found: {0}")]
    NotFound(PathBuf),

    #[error("reading taxonomy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid taxonomy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("taxonomy must list at least one category")]
    Empty,

    #[error("taxonomy category names must not be blank")]
    BlankCategory,

    #[error("duplicate taxonomy category {0:?}")]
    Duplicate(String),

    #[error("keywords given for unknown category {0:?}")]
    UnknownKeywordCategory(String),
}

#[derive(Deserialize)]
struct TaxonomyFile {
    categories: Vec<String>,
    #[serde(default)]
    keywords: HashMap<String, Vec<String>>,
}

/// The closed set of document types a classifier may report.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<String>,
    /// category → lowercase keywords
    keywords: HashMap<String, Vec<String>>,
}

impl Taxonomy {
    pub fn new(categories: Vec<String>) -> Result<Self, TaxonomyError> {
        Self::with_keywords(categories, HashMap::new())
    }

    pub fn with_keywords(
        categories: Vec<String>,
        keywords: HashMap<String, Vec<String>>,
    ) -> Result<Self, TaxonomyError> {
        if categories.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        let mut seen = HashSet::new();
        for category in &categories {
            if category.trim().is_empty() {
                return Err(TaxonomyError::BlankCategory);
            }
            if !seen.insert(category.as_str()) {
                return Err(TaxonomyError::Duplicate(category.clone()));
            }
        }
        if let Some(unknown) = keywords.keys().find(|k| !seen.contains(k.as_str())) {
            return Err(TaxonomyError::UnknownKeywordCategory(unknown.clone()));
        }

        let keywords = keywords
            .into_iter()
            .map(|(category, words)| {
                let words = words
                    .iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (category, words)
            })
            .collect();

        Ok(Self {
            categories,
            keywords,
        })
    }

    /// Parse a taxonomy from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = serde_yaml::from_str(yaml)?;
        Self::with_keywords(file.categories, file.keywords)
    }

    /// Load a taxonomy file from disk.
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        if !path.exists() {
            return Err(TaxonomyError::NotFound(path.to_path_buf()));
        }
        let yaml = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let taxonomy = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            categories = taxonomy.categories.len(),
            "loaded taxonomy"
        );
        Ok(taxonomy)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, document_type: &str) -> bool {
        self.categories.iter().any(|c| c == document_type)
    }

    /// Lowercase keywords for a category; the category name itself when none
    /// were configured.
    pub fn keywords(&self, category: &str) -> Vec<String> {
        match self.keywords.get(category) {
            Some(words) if !words.is_empty() => words.clone(),
            _ => vec![category.to_lowercase()],
        }
    }
}
