mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use docsplit_ai::{
    Classifier, DEFAULT_BASE_URL, DEFAULT_MODEL, KeywordClassifier, LlmClassifier, Taxonomy,
    TaxonomyGuard,
};
use docsplit_core::config::DEFAULT_WINDOW_SIZE;
use docsplit_core::{PipelineConfig, SidecarScope};
use docsplit_engine::Pipeline;
use tracing::{info, info_span, warn};

#[derive(Parser)]
#[command(
    name = "docsplit",
    version,
    about = "Split scanned PDF bundles into individually classified documents"
)]
struct Cli {
    /// Directory containing the PDF bundles
    input_dir: PathBuf,

    /// Root directory for the organized output
    output_dir: PathBuf,

    /// YAML file listing the document categories
    #[arg(short, long)]
    taxonomy: PathBuf,

    /// Classification strategy
    #[arg(long, value_enum, default_value_t = ClassifierKind::Llm)]
    classifier: ClassifierKind,

    /// API key for the chat-completions endpoint
    #[arg(long, alias = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model name sent to the endpoint
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Replace files left by a previous run
    #[arg(long)]
    overwrite: bool,

    /// Classify and report without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Pages sent to the classifier per call
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    window_size: u32,

    /// Keep blank pages instead of dropping them before classification
    #[arg(long)]
    keep_blank_pages: bool,

    /// Source PDFs processed at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Write one sidecar for the run or one per source PDF
    #[arg(long, value_enum, default_value_t = SidecarArg::Directory)]
    sidecar: SidecarArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClassifierKind {
    /// OpenAI-compatible chat completions
    Llm,
    /// Offline keyword matching from the taxonomy
    Keywords,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SidecarArg {
    Directory,
    PerSource,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.input_dir, &self.output_dir);
        config.window_size = self.window_size;
        config.overwrite = self.overwrite;
        config.dry_run = self.dry_run;
        config.remove_blank_pages = !self.keep_blank_pages;
        config.concurrency = self.concurrency;
        config.sidecar = match self.sidecar {
            SidecarArg::Directory => SidecarScope::Directory,
            SidecarArg::PerSource => SidecarScope::PerSource,
        };
        config
    }

    fn classifier(&self, taxonomy: Taxonomy) -> anyhow::Result<Arc<dyn Classifier>> {
        let classifier: Arc<dyn Classifier> = match self.classifier {
            ClassifierKind::Llm => {
                let api_key = self
                    .api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .context("the llm classifier needs --api-key or OPENAI_API_KEY")?;
                let llm = LlmClassifier::new(api_key, &taxonomy)
                    .with_model(&self.model)
                    .with_base_url(&self.base_url);
                Arc::new(TaxonomyGuard::new(llm, taxonomy))
            }
            ClassifierKind::Keywords => {
                let keywords = KeywordClassifier::new(&taxonomy);
                Arc::new(TaxonomyGuard::new(keywords, taxonomy))
            }
        };
        Ok(classifier)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("docsplit v{}", env!("CARGO_PKG_VERSION"));

    let taxonomy = Taxonomy::load(&cli.taxonomy)
        .with_context(|| format!("loading taxonomy {}", cli.taxonomy.display()))?;
    let classifier = cli.classifier(taxonomy)?;

    let pipeline = Pipeline::new(cli.pipeline_config(), classifier)
        .with_span(info_span!("run", input = %cli.input_dir.display()));

    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next window");
            cancel.cancel();
        }
    });

    let report = pipeline.run().await.context("running pipeline")?;
    display::print_report(&report);

    if report.cancelled {
        bail!("run cancelled; {} source(s) not completed", report.interrupted.len());
    }
    if !report.failures.is_empty() {
        bail!("{} source(s) failed", report.failures.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["docsplit", "in", "out", "--taxonomy", "t.yaml"]).unwrap();
        let config = cli.pipeline_config();
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert!(config.remove_blank_pages);
        assert!(!config.dry_run && !config.overwrite);
        assert_eq!(config.sidecar, SidecarScope::Directory);
        assert_eq!(cli.classifier, ClassifierKind::Llm);
    }

    #[test]
    fn flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "docsplit",
            "in",
            "out",
            "-t",
            "t.yaml",
            "--classifier",
            "keywords",
            "--window-size",
            "3",
            "--keep-blank-pages",
            "--dry-run",
            "--overwrite",
            "--concurrency",
            "4",
            "--sidecar",
            "per-source",
        ])
        .unwrap();
        let config = cli.pipeline_config();
        assert_eq!(config.window_size, 3);
        assert!(!config.remove_blank_pages);
        assert!(config.dry_run && config.overwrite);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.sidecar, SidecarScope::PerSource);
    }

    #[test]
    fn zero_window_rejected() {
        assert!(
            Cli::try_parse_from(["docsplit", "in", "out", "-t", "t.yaml", "--window-size", "0"])
                .is_err()
        );
    }

    #[test]
    fn llm_without_key_fails() {
        let mut cli =
            Cli::try_parse_from(["docsplit", "in", "out", "-t", "t.yaml"]).unwrap();
        cli.api_key = None;
        let taxonomy = Taxonomy::new(vec!["Will".into()]).unwrap();
        assert!(cli.classifier(taxonomy).is_err());
    }

    #[test]
    fn openai_api_key_alias() {
        let cli = Cli::try_parse_from([
            "docsplit",
            "in",
            "out",
            "-t",
            "t.yaml",
            "--openai-api-key",
            "sk-old",
        ])
        .unwrap();
        assert_eq!(cli.api_key.as_deref(), Some("sk-old"));
    }

    #[test]
    fn keyword_classifier_needs_no_key() {
        let mut cli = Cli::try_parse_from([
            "docsplit", "in", "out", "-t", "t.yaml", "--classifier", "keywords",
        ])
        .unwrap();
        cli.api_key = None;
        let taxonomy = Taxonomy::new(vec!["Will".into()]).unwrap();
        assert_eq!(cli.classifier(taxonomy).unwrap().name(), "keywords");
    }
}
