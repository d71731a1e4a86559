//! Run ledger: accumulates artifacts and persists the YAML sidecar.

use std::io::Write;
use std::path::Path;

use docsplit_core::{DocumentArtifact, RunRecord};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::StoreError;

#[derive(Debug, Default)]
pub struct RunLedger {
    record: RunRecord,
    dry_run: bool,
}

impl RunLedger {
    pub fn new(dry_run: bool) -> Self {
        Self {
            record: RunRecord::default(),
            dry_run,
        }
    }

    /// Append an artifact. No deduplication.
    pub fn record(&mut self, artifact: DocumentArtifact) {
        self.record.documents.push(artifact);
    }

    /// Store the sorted unclaimed pages of one source, replacing earlier entries.
    pub fn record_unprocessed(&mut self, source: impl Into<String>, mut pages: Vec<u32>) {
        pages.sort_unstable();
        pages.dedup();
        self.record.unprocessed_pages.insert(source.into(), pages);
    }

    pub fn run_record(&self) -> &RunRecord {
        &self.record
    }

    pub fn into_record(self) -> RunRecord {
        self.record
    }

    /// Write the sidecar to `destination`.
    ///
    /// The YAML goes to a temporary file next to `destination` and is renamed
    /// into place, so readers see either the old file or the complete new
    /// one. Returns `false` without touching the filesystem in dry-run.
    pub fn persist(&self, destination: &Path) -> Result<bool, StoreError> {
        if self.dry_run {
            debug!(path = %destination.display(), "dry run, sidecar not written");
            return Ok(false);
        }

        let yaml = serde_yaml::to_string(&self.record)?;
        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(yaml.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(destination)
            .map_err(|e| StoreError::io(destination, e.error))?;

        info!(
            path = %destination.display(),
            documents = self.record.documents.len(),
            sources_with_unprocessed = self.record.unprocessed_pages.values().filter(|p| !p.is_empty()).count(),
            "wrote sidecar"
        );
        Ok(true)
    }
}
