pub mod artifact;
pub mod config;
pub mod naming;
pub mod span;
pub mod window;

pub use artifact::{DocumentArtifact, RunRecord, UNORGANIZED};
pub use config::{ConfigError, PipelineConfig, SidecarScope};
pub use span::{DocumentSpanCandidate, PageRange, group_consecutive};
pub use window::{build_window_text, split_window_text};
