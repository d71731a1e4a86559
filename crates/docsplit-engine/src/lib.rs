//! Segmentation engine: windowed boundary scanning and the directory pipeline.

mod cancel;
mod pipeline;
mod scanner;

pub use cancel::CancelFlag;
pub use pipeline::{Pipeline, PipelineError, RunReport, SourceFailure, SourceReport};
pub use scanner::{BoundaryScanner, RejectReason, Rejection, ScanError, ScanOutcome};
