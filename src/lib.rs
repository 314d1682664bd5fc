// Testtrail - Test-Run Provenance Tracker
// Durable per-test outcome history, a baseline/diff trail of source changes,
// and runaway-run protection for automated grading harnesses.

pub mod archive;
pub mod config;
pub mod diff;
pub mod lifecycle;
pub mod models;
pub mod redact;
pub mod store;
pub mod timing;

pub use anyhow::{Context, Result};

// Re-export commonly used types
pub use config::HarnessConfig;
pub use lifecycle::RunLogger;
pub use models::{IgnoreReason, RunInfo, TestStatus};
pub use store::RunStore;
