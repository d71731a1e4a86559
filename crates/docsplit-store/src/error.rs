use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("page range {start}-{end} is outside 1-{total}")]
    InvalidRange { start: u32, end: u32, total: u32 },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf error in {path}: {source}")]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("no free file name after {attempts} attempts for {path}")]
    CollisionExhausted { path: PathBuf, attempts: u32 },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn pdf(path: impl Into<PathBuf>, source: lopdf::Error) -> Self {
        Self::Pdf {
            path: path.into(),
            source,
        }
    }
}
