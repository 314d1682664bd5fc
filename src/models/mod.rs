pub mod run_info;

pub use run_info::{IgnoreReason, RunInfo, TestFileOutcomes, TestStatus};
