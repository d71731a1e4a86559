//! Run configuration shared by the engine and the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::source_stem;

pub const DEFAULT_WINDOW_SIZE: u32 = 5;
pub const RUN_SIDECAR_NAME: &str = "run_metadata.yaml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    WindowSize,

    #[error("concurrency must be at least 1")]
    Concurrency,

    #[error("input directory does not exist: {0}")]
    InputDir(PathBuf),
}

/// Where the run sidecar is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SidecarScope {
    /// One `run_metadata.yaml` for the whole input directory.
    #[default]
    Directory,
    /// One `<stem>_metadata.yaml` per source document.
    PerSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Pages per classifier call.
    pub window_size: u32,
    /// Replace files left by a previous run instead of suffixing around them.
    pub overwrite: bool,
    /// Classify and report only; no files are written.
    pub dry_run: bool,
    pub remove_blank_pages: bool,
    /// Source documents processed at once.
    pub concurrency: usize,
    pub sidecar: SidecarScope,
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            window_size: DEFAULT_WINDOW_SIZE,
            overwrite: false,
            dry_run: false,
            remove_blank_pages: false,
            concurrency: 1,
            sidecar: SidecarScope::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::WindowSize);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::InputDir(self.input_dir.clone()));
        }
        Ok(())
    }

    /// Sidecar location for the whole run.
    pub fn run_sidecar_path(&self) -> PathBuf {
        self.output_dir.join(RUN_SIDECAR_NAME)
    }

    /// Sidecar location for one source document in [`SidecarScope::PerSource`].
    pub fn source_sidecar_path(&self, source: &Path) -> PathBuf {
        self.output_dir
            .join(format!("{}_metadata.yaml", source_stem(source)))
    }
}
