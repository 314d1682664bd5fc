//! Policy constants and collaborator-supplied paths.
//!
//! All limits are fixed policy, not runtime-negotiated: the harness must
//! behave identically for every student repository it is dropped into.

use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on the student repository size before any restore work.
pub const MAX_REPO_BYTES: u64 = 10 * 1024 * 1024;

/// Hard ceiling on the persisted archive size.
pub const MAX_ARCHIVE_BYTES: u64 = 10 * 1024 * 1024;

/// Per-file ceiling; larger files are sentineled instead of diffed.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Cumulative patch bytes in one run that schedule a rebaseline for the next.
pub const REBASELINE_THRESHOLD_BYTES: u64 = 10 * 1024;

/// Time budget for per-test lifecycle hooks.
pub const HOOK_BUDGET: Duration = Duration::from_millis(500);

/// Time budget for suite teardown.
pub const TEARDOWN_BUDGET: Duration = Duration::from_millis(3000);

/// A single overrun beyond this multiple of the budget trips the breaker
/// outright, without waiting for repeat offenses.
pub const SEVERE_MULTIPLIER: u32 = 5;

/// Number of slots in the circular strike ledger.
pub const STRIKE_WINDOW: u64 = 3;

/// Strikes within the window that trip the breaker.
pub const MAX_STRIKES: usize = 2;

/// State document filename inside the persisted archive.
pub const RUN_INFO_FILENAME: &str = "testRunInfo.json";

/// Error log filename inside the persisted archive.
pub const ERROR_LOG_FILENAME: &str = "error-logs.txt";

/// Filename of the single persisted archive.
pub const ARCHIVE_FILENAME: &str = "run.tar";

/// Where the student's project lives and which files get tracked.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Root of the student source tree.
    pub source_root: PathBuf,
    /// Suffix of tracked source files (e.g. ".rs").
    pub source_suffix: String,
    /// Directory owned by the harness. Holds the persisted archive, and its
    /// final component name is excluded from every source walk.
    pub harness_dir: PathBuf,
}

impl HarnessConfig {
    pub fn new(
        source_root: impl Into<PathBuf>,
        source_suffix: impl Into<String>,
        harness_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            source_suffix: source_suffix.into(),
            harness_dir: harness_dir.into(),
        }
    }

    /// Path of the persisted archive.
    pub fn archive_path(&self) -> PathBuf {
        self.harness_dir.join(ARCHIVE_FILENAME)
    }

    /// Subtree name skipped during source walks.
    pub fn excluded_dir_name(&self) -> &str {
        self.harness_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("testtrail")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new("src", ".rs", "src/testtrail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = HarnessConfig::default();
        assert_eq!(config.archive_path(), PathBuf::from("src/testtrail/run.tar"));
        assert_eq!(config.excluded_dir_name(), "testtrail");
    }

    #[test]
    fn test_excluded_dir_is_final_component() {
        let config = HarnessConfig::new("project/src", ".rs", "project/src/grading");
        assert_eq!(config.excluded_dir_name(), "grading");
    }
}
