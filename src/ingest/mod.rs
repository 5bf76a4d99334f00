//! Ingestion runs: file discovery, per-file pipeline, artifacts and indexing.

pub mod progress;
pub mod reprocess;
pub mod service;

pub use progress::{ProgressSnapshot, ProgressTracker, RunStatus};
pub use reprocess::{ReprocessSummary, flagged_pages};
pub use service::{
    FileFailure, FileOutcome, IngestError, IngestRequest, IngestService, IngestSettings,
    IngestSummary, discover_files,
};
