//! Directory pipeline: scan every PDF in the input directory, extract the
//! documents and write the run sidecar.
//!
//! Sources run on a [`JoinSet`], at most `concurrency` at a time. Outcomes
//! are committed to the ledger in source order once every worker is done, so
//! the sidecar does not depend on scheduling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docsplit_ai::Classifier;
use docsplit_core::naming::with_suffix;
use docsplit_core::{ConfigError, DocumentArtifact, PageRange, PipelineConfig, SidecarScope};
use docsplit_store::{
    ExtractOptions, PageWriter, PdfDocument, RunLedger, SegmentExtractor, StoreError,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::cancel::CancelFlag;
use crate::scanner::{BoundaryScanner, ScanError, ScanOutcome, worker_lost};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("reading input directory {path}: {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("preparing output directory: {0}")]
    Output(#[source] StoreError),

    #[error("writing sidecar: {0}")]
    Sidecar(#[source] StoreError),
}

/// A completed source document.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: PathBuf,
    pub artifacts: Vec<DocumentArtifact>,
    pub unprocessed_pages: Vec<u32>,
    /// Original page numbers dropped as blank before scanning.
    pub removed_blank_pages: Vec<u32>,
    pub rejected_candidates: usize,
    pub windows: u32,
}

/// A source document that did not complete.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: PathBuf,
    pub range: Option<PageRange>,
    pub cause: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Completed sources, in source order.
    pub sources: Vec<SourceReport>,
    pub failures: Vec<SourceFailure>,
    /// Sources stopped or never started because the run was cancelled.
    pub interrupted: Vec<PathBuf>,
    pub cancelled: bool,
    /// Sidecar files written.
    pub sidecars: Vec<PathBuf>,
}

impl RunReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &DocumentArtifact> {
        self.sources.iter().flat_map(|s| s.artifacts.iter())
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

struct Completed {
    outcome: ScanOutcome,
    removed_blank_pages: Vec<u32>,
}

pub struct Pipeline {
    config: PipelineConfig,
    classifier: Arc<dyn Classifier>,
    cancel: CancelFlag,
    span: Span,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            classifier,
            cancel: CancelFlag::new(),
            span: info_span!("pipeline"),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Parent span for everything this pipeline logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        self.config.validate()?;

        let sources = discover_sources(&self.config.input_dir)?;
        info!(
            parent: &self.span,
            input = %self.config.input_dir.display(),
            output = %self.config.output_dir.display(),
            sources = sources.len(),
            classifier = self.classifier.name(),
            dry_run = self.config.dry_run,
            concurrency = self.config.concurrency,
            "run started"
        );

        let extractor = Arc::new(SegmentExtractor::new(
            &self.config.output_dir,
            ExtractOptions {
                overwrite: self.config.overwrite,
                dry_run: self.config.dry_run,
            },
        ));
        extractor.prepare().map_err(PipelineError::Output)?;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers = JoinSet::new();
        for (index, path) in sources.iter().enumerate() {
            let semaphore = semaphore.clone();
            let classifier = self.classifier.clone();
            let extractor = extractor.clone();
            let cancel = self.cancel.clone();
            let path = path.clone();
            let window_size = self.config.window_size;
            let remove_blank = self.config.remove_blank_pages;
            let span = info_span!(parent: &self.span, "source", path = %path.display());

            workers.spawn(
                async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            process_source(
                                &path,
                                classifier.as_ref(),
                                extractor,
                                window_size,
                                remove_blank,
                                cancel,
                            )
                            .await
                        }
                        Err(_) => Err(ScanError::Cancelled { document: path }),
                    };
                    (index, result)
                }
                .instrument(span),
            );
        }

        let mut results: Vec<Option<Result<Completed, ScanError>>> =
            sources.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(parent: &self.span, error = %e, "source worker panicked"),
            }
        }

        let mut report = RunReport {
            started_at,
            finished_at: started_at,
            dry_run: self.config.dry_run,
            sources: Vec::new(),
            failures: Vec::new(),
            interrupted: Vec::new(),
            cancelled: self.cancel.is_cancelled(),
            sidecars: Vec::new(),
        };
        let mut ledgers: Vec<(PathBuf, RunLedger)> = Vec::new();
        let mut sidecar_paths = HashSet::new();
        if self.config.sidecar == SidecarScope::Directory {
            let path = unique_sidecar(&mut sidecar_paths, self.config.run_sidecar_path());
            ledgers.push((path, RunLedger::new(self.config.dry_run)));
        }

        for (path, result) in sources.into_iter().zip(results) {
            match result {
                Some(Ok(completed)) => {
                    let slot = match self.config.sidecar {
                        SidecarScope::Directory => 0,
                        SidecarScope::PerSource => {
                            let sidecar = unique_sidecar(
                                &mut sidecar_paths,
                                self.config.source_sidecar_path(&path),
                            );
                            ledgers.push((sidecar, RunLedger::new(self.config.dry_run)));
                            ledgers.len() - 1
                        }
                    };
                    commit(&mut ledgers[slot].1, &path, &completed);
                    report.sources.push(SourceReport {
                        artifacts: completed.outcome.artifacts,
                        unprocessed_pages: completed.outcome.unclaimed_pages,
                        removed_blank_pages: completed.removed_blank_pages,
                        rejected_candidates: completed.outcome.rejections.len(),
                        windows: completed.outcome.windows,
                        source: path,
                    });
                }
                Some(Err(ScanError::Cancelled { .. })) => report.interrupted.push(path),
                Some(Err(e)) => {
                    warn!(parent: &self.span, error = %e, "source failed");
                    report.failures.push(SourceFailure {
                        range: e.range(),
                        cause: e.to_string(),
                        source: path,
                    });
                }
                None => report.failures.push(SourceFailure {
                    source: path,
                    range: None,
                    cause: "worker panicked".to_string(),
                }),
            }
        }

        for (destination, ledger) in &ledgers {
            if ledger.persist(destination).map_err(PipelineError::Sidecar)? {
                report.sidecars.push(destination.clone());
            }
        }

        report.finished_at = Utc::now();
        info!(
            parent: &self.span,
            completed = report.sources.len(),
            documents = report.artifacts().count(),
            failed = report.failures.len(),
            interrupted = report.interrupted.len(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "run finished"
        );
        Ok(report)
    }
}

/// `path`, or the first `_n` variant no earlier sidecar of this run uses.
/// Sources such as `estate.pdf` and `estate.PDF` share a stem.
fn unique_sidecar(used: &mut HashSet<PathBuf>, path: PathBuf) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut candidate = path.clone();
    let mut n = 0;
    while used.contains(&candidate) {
        n += 1;
        candidate = path.with_file_name(with_suffix(&name, n));
    }
    used.insert(candidate.clone());
    candidate
}

fn commit(ledger: &mut RunLedger, source: &Path, completed: &Completed) {
    for artifact in &completed.outcome.artifacts {
        ledger.record(artifact.clone());
    }
    ledger.record_unprocessed(
        source.display().to_string(),
        completed.outcome.unclaimed_pages.clone(),
    );
}

async fn process_source(
    path: &Path,
    classifier: &dyn Classifier,
    extractor: Arc<SegmentExtractor>,
    window_size: u32,
    remove_blank: bool,
    cancel: CancelFlag,
) -> Result<Completed, ScanError> {
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled {
            document: path.to_path_buf(),
        });
    }

    let owned = path.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || {
        let mut doc = PdfDocument::open(&owned)?;
        let removed = if remove_blank {
            doc.remove_blank_pages()
        } else {
            Vec::new()
        };
        Ok::<_, StoreError>((doc, removed))
    })
    .await;

    let (doc, removed_blank_pages) = match loaded {
        Ok(Ok(loaded)) => loaded,
        Ok(Err(cause)) => {
            return Err(ScanError::Open {
                document: path.to_path_buf(),
                cause,
            });
        }
        Err(join) => {
            return Err(ScanError::Open {
                document: path.to_path_buf(),
                cause: worker_lost(path, join),
            });
        }
    };

    let doc: Arc<dyn PageWriter> = Arc::new(doc);
    let outcome = BoundaryScanner::new(classifier, extractor, window_size)
        .with_cancel(cancel)
        .scan(doc)
        .await?;

    Ok(Completed {
        outcome,
        removed_blank_pages,
    })
}

/// PDF files directly inside `dir`, sorted by path.
fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let input_err = |source| PipelineError::InputDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(input_err)? {
        let path = entry.map_err(input_err)?.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use docsplit_ai::{ClassificationError, KeywordClassifier, Taxonomy};
    use docsplit_core::{DocumentSpanCandidate, RunRecord, UNORGANIZED};
    use docsplit_store::test_utils::{TestPage, test_pdf, write_text_pdf};

    fn keywords() -> Arc<dyn Classifier> {
        let taxonomy = Taxonomy::from_yaml(
            "categories: [Will, Deed]\nkeywords:\n  Will: [\"last will\"]\n  Deed: [\"grant deed\"]\n",
        )
        .unwrap();
        Arc::new(KeywordClassifier::new(&taxonomy))
    }

    fn read_sidecar(path: &Path) -> RunRecord {
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    struct Dirs {
        _tmp: tempfile::TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        Dirs {
            _tmp: tmp,
            input,
            output,
        }
    }

    #[tokio::test]
    async fn splits_bundle_and_writes_sidecar() {
        let d = dirs();
        write_text_pdf(
            &d.input,
            "estate.pdf",
            &["Cover letter", "LAST WILL of Jane Doe", "witnesses", "GRANT DEED lot 4"],
        );

        let report = Pipeline::new(PipelineConfig::new(&d.input, &d.output), keywords())
            .run()
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.sources.len(), 1);
        let source = &report.sources[0];
        assert_eq!(source.unprocessed_pages, vec![1]);

        let types: Vec<(&str, PageRange)> = source
            .artifacts
            .iter()
            .map(|a| (a.document_type.as_str(), a.range()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("Will", PageRange::new(2, 3)),
                ("Deed", PageRange::single(4)),
                (UNORGANIZED, PageRange::single(1)),
            ]
        );

        let will = d.output.join("Will/estate_pages_2-3.pdf");
        let out = PdfDocument::open(&will).unwrap();
        assert_eq!(docsplit_store::PageStore::page_count(&out), 2);
        assert!(d.output.join("Unorganized/unorganized_pages_1-1.pdf").exists());

        let sidecar = d.output.join("run_metadata.yaml");
        assert_eq!(report.sidecars, vec![sidecar.clone()]);
        let record = read_sidecar(&sidecar);
        assert_eq!(record.documents.len(), 3);
        let key = d.input.join("estate.pdf").display().to_string();
        assert_eq!(record.unprocessed_pages[&key], vec![1]);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let d = dirs();
        write_text_pdf(&d.input, "a.pdf", &["LAST WILL", "GRANT DEED"]);
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.dry_run = true;

        let report = Pipeline::new(config, keywords()).run().await.unwrap();

        assert!(!d.output.exists());
        assert_eq!(report.artifacts().count(), 2);
        assert!(report.artifacts().all(|a| a.output_path.is_none()));
        assert!(report.sidecars.is_empty());
        assert!(report.dry_run);
    }

    #[tokio::test]
    async fn broken_source_is_isolated() {
        let d = dirs();
        write_text_pdf(&d.input, "b_good.pdf", &["LAST WILL"]);
        std::fs::write(d.input.join("a_broken.pdf"), b"%PDF-1.5 truncated").unwrap();
        std::fs::write(d.input.join("notes.txt"), b"ignored").unwrap();

        let report = Pipeline::new(PipelineConfig::new(&d.input, &d.output), keywords())
            .run()
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].source.ends_with("a_broken.pdf"));
        assert!(report.failures[0].cause.contains("a_broken.pdf"));
        assert_eq!(report.sources.len(), 1);
        assert!(!report.is_success());

        let record = read_sidecar(&d.output.join("run_metadata.yaml"));
        assert_eq!(record.documents.len(), 1);
        assert_eq!(record.unprocessed_pages.len(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_reports_window() {
        struct Broken;

        #[async_trait]
        impl Classifier for Broken {
            async fn classify(
                &self,
                _window: &str,
            ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
                Err(ClassificationError::UnknownType("Recipe".into()))
            }
        }

        let d = dirs();
        write_text_pdf(&d.input, "a.pdf", &["x", "y", "z"]);
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.window_size = 2;

        let report = Pipeline::new(config, Arc::new(Broken)).run().await.unwrap();
        assert_eq!(report.failures[0].range, Some(PageRange::new(1, 2)));
        assert!(report.failures[0].cause.contains("Recipe"));
        let record = read_sidecar(&d.output.join("run_metadata.yaml"));
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn blank_pages_removed_before_scanning() {
        let d = dirs();
        std::fs::write(
            d.input.join("scan.pdf"),
            test_pdf(&[
                TestPage::Text("LAST WILL"),
                TestPage::Blank,
                TestPage::Text("GRANT DEED"),
                TestPage::Blank,
            ]),
        )
        .unwrap();
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.remove_blank_pages = true;

        let report = Pipeline::new(config, keywords()).run().await.unwrap();
        let source = &report.sources[0];
        assert_eq!(source.removed_blank_pages, vec![2, 4]);
        let ranges: Vec<PageRange> = source.artifacts.iter().map(|a| a.range()).collect();
        assert_eq!(ranges, vec![PageRange::single(1), PageRange::single(2)]);
        assert!(source.unprocessed_pages.is_empty());
        assert!(d.input.join("scan.pdf").exists());
    }

    #[tokio::test]
    async fn per_source_sidecars() {
        let d = dirs();
        write_text_pdf(&d.input, "one.pdf", &["LAST WILL"]);
        write_text_pdf(&d.input, "two.pdf", &["GRANT DEED"]);
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.sidecar = SidecarScope::PerSource;

        let report = Pipeline::new(config, keywords()).run().await.unwrap();
        assert_eq!(report.sidecars.len(), 2);

        let one = read_sidecar(&d.output.join("one_metadata.yaml"));
        assert_eq!(one.documents.len(), 1);
        assert_eq!(one.documents[0].document_type, "Will");
        let two = read_sidecar(&d.output.join("two_metadata.yaml"));
        assert_eq!(two.documents[0].document_type, "Deed");
        assert!(!d.output.join("run_metadata.yaml").exists());
    }

    #[tokio::test]
    async fn per_source_sidecars_with_shared_stem() {
        let d = dirs();
        write_text_pdf(&d.input, "estate.pdf", &["LAST WILL"]);
        write_text_pdf(&d.input, "estate.PDF", &["GRANT DEED"]);
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.sidecar = SidecarScope::PerSource;

        let report = Pipeline::new(config, keywords()).run().await.unwrap();
        assert_eq!(report.sources.len(), 2);

        let first = d.output.join("estate_metadata.yaml");
        let second = d.output.join("estate_metadata_1.yaml");
        assert_eq!(report.sidecars, vec![first.clone(), second.clone()]);

        // "estate.PDF" sorts before "estate.pdf".
        let upper = read_sidecar(&first);
        assert!(upper.documents[0].source_document.ends_with("estate.PDF"));
        assert_eq!(upper.documents[0].document_type, "Deed");
        let lower = read_sidecar(&second);
        assert!(lower.documents[0].source_document.ends_with("estate.pdf"));
        assert_eq!(lower.documents[0].document_type, "Will");
    }

    #[test]
    fn sidecar_names_are_suffixed_on_reuse() {
        let mut used = HashSet::new();
        let path = PathBuf::from("out/estate_metadata.yaml");
        assert_eq!(unique_sidecar(&mut used, path.clone()), path);
        assert_eq!(
            unique_sidecar(&mut used, path.clone()),
            PathBuf::from("out/estate_metadata_1.yaml")
        );
        assert_eq!(
            unique_sidecar(&mut used, path),
            PathBuf::from("out/estate_metadata_2.yaml")
        );
    }

    #[tokio::test]
    async fn concurrent_run_records_in_source_order() {
        let d = dirs();
        for name in ["c.pdf", "a.pdf", "b.pdf"] {
            write_text_pdf(&d.input, name, &["LAST WILL", "GRANT DEED"]);
        }
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.concurrency = 3;

        let report = Pipeline::new(config, keywords()).run().await.unwrap();
        assert_eq!(report.sources.len(), 3);

        let record = read_sidecar(&d.output.join("run_metadata.yaml"));
        let order: Vec<String> = record
            .documents
            .iter()
            .map(|a| a.source_document.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, ["a.pdf", "a.pdf", "b.pdf", "b.pdf", "c.pdf", "c.pdf"]);

        let wills: Vec<_> = std::fs::read_dir(d.output.join("Will")).unwrap().collect();
        assert_eq!(wills.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_drops_interrupted_source() {
        /// Classifies with keywords, then cancels the run after seeing a deed.
        struct CancelOnDeed {
            inner: Arc<dyn Classifier>,
            cancel: CancelFlag,
            fired: AtomicBool,
        }

        #[async_trait]
        impl Classifier for CancelOnDeed {
            async fn classify(
                &self,
                window: &str,
            ) -> Result<Vec<DocumentSpanCandidate>, ClassificationError> {
                let spans = self.inner.classify(window).await?;
                if window.contains("GRANT DEED") && !self.fired.swap(true, Ordering::SeqCst) {
                    self.cancel.cancel();
                }
                Ok(spans)
            }
        }

        let d = dirs();
        write_text_pdf(&d.input, "a.pdf", &["LAST WILL"]);
        write_text_pdf(&d.input, "b.pdf", &["GRANT DEED", "more", "pages", "here"]);

        let cancel = CancelFlag::new();
        let classifier = Arc::new(CancelOnDeed {
            inner: keywords(),
            cancel: cancel.clone(),
            fired: AtomicBool::new(false),
        });
        let mut config = PipelineConfig::new(&d.input, &d.output);
        config.window_size = 1;

        let report = Pipeline::new(config, classifier)
            .with_cancel(cancel)
            .run()
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.interrupted.iter().any(|p| p.ends_with("b.pdf")));
        assert!(report.failures.is_empty());

        let deeds = std::fs::read_dir(d.output.join("Deed"))
            .map(|dir| dir.count())
            .unwrap_or(0);
        assert_eq!(deeds, 0);

        let record = read_sidecar(&d.output.join("run_metadata.yaml"));
        assert!(
            record
                .documents
                .iter()
                .all(|a| !a.source_document.ends_with("b.pdf"))
        );
        assert!(
            record
                .unprocessed_pages
                .keys()
                .all(|k| !k.ends_with("b.pdf"))
        );
    }

    #[tokio::test]
    async fn missing_input_dir() {
        let d = dirs();
        let config = PipelineConfig::new(d.input.join("nope"), &d.output);
        assert!(matches!(
            Pipeline::new(config, keywords()).run().await,
            Err(PipelineError::Config(ConfigError::InputDir(_)))
        ));
    }

    #[tokio::test]
    async fn empty_input_dir_writes_empty_sidecar() {
        let d = dirs();
        let report = Pipeline::new(PipelineConfig::new(&d.input, &d.output), keywords())
            .run()
            .await
            .unwrap();
        assert!(report.sources.is_empty());
        assert!(d.output.join(UNORGANIZED).is_dir());
        assert!(read_sidecar(&d.output.join("run_metadata.yaml")).is_empty());
    }
}
