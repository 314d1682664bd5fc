//! RunStore - testRunInfo.json CRUD operations

use crate::config::{MAX_STRIKES, STRIKE_WINDOW};
use crate::models::{IgnoreReason, RunInfo, TestStatus};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// State store for one suite run.
///
/// The document is loaded once, mutated in place, and written back at
/// teardown by the lifecycle controller.
#[derive(Debug)]
pub struct RunStore {
    info: RunInfo,
}

impl RunStore {
    /// Load the document, or create a default one if none exists yet.
    ///
    /// A file that exists but cannot be parsed is an error: silently
    /// resetting to an empty document would discard the run history.
    pub fn load(path: &Path) -> Result<Self> {
        let info = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut info: RunInfo = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            // The kill switch is process-scoped. A value persisted by a slow
            // teardown must not disable every future run.
            info.skip_logging = false;
            info
        } else {
            RunInfo::new(seed_from_clock())
        };

        Ok(Self { info })
    }

    /// Write the document as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.info)
            .context("Failed to serialize run info")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Get the document (read-only).
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    // =========================================================================
    // Run Lifecycle
    // =========================================================================

    /// Called exactly once per suite invocation, before any status is
    /// recorded.
    pub fn increment_run_number(&mut self) {
        self.info.prev_run_number += 1;
    }

    pub fn run_number(&self) -> u64 {
        self.info.prev_run_number
    }

    pub fn seed(&self) -> u32 {
        self.info.random_seed
    }

    pub fn redact_diffs(&self) -> bool {
        self.info.redact_diffs
    }

    pub fn skip_logging(&self) -> bool {
        self.info.skip_logging
    }

    /// One-way for the remainder of the process.
    pub fn set_skip_logging(&mut self) {
        self.info.skip_logging = true;
    }

    /// Record the wall-clock start of the current run.
    pub fn record_run_time(&mut self, timestamp: String) {
        let run = self.info.prev_run_number.to_string();
        self.info.run_times.insert(run, timestamp);
    }

    // =========================================================================
    // Test Outcomes
    // =========================================================================

    /// Record a status for `(test_file, test_name)` under the current run,
    /// creating the nested records on first use.
    pub fn record_status(
        &mut self,
        test_file: &str,
        test_name: &str,
        status: TestStatus,
        cause: Option<&str>,
    ) {
        let run = self.info.prev_run_number.to_string();
        self.info
            .outcomes
            .entry(test_file.to_string())
            .or_default()
            .entry(test_name.to_string())
            .or_default()
            .insert(run, status.render(cause));
    }

    // =========================================================================
    // Strike Ledger
    // =========================================================================

    fn strike_slot(&self) -> String {
        (self.info.prev_run_number % STRIKE_WINDOW).to_string()
    }

    /// Record a timing-budget violation for the current run.
    pub fn add_strike(&mut self) {
        let slot = self.strike_slot();
        self.info.strikes.insert(slot, true);
    }

    /// Clear the current run's slot so only the prior occupant counts
    /// against history. Called once at suite start.
    pub fn clear_current_strike(&mut self) {
        let slot = self.strike_slot();
        self.info.strikes.insert(slot, false);
    }

    /// Whether the strikes within the window have reached the threshold.
    pub fn too_many_strikes(&self) -> bool {
        let count = self
            .info
            .strikes
            .iter()
            .filter(|(slot, struck)| {
                **struck
                    && slot
                        .parse::<u64>()
                        .map_or(false, |index| index < STRIKE_WINDOW)
            })
            .count();
        count >= MAX_STRIKES
    }

    // =========================================================================
    // Ignore List
    // =========================================================================

    /// Permanently exclude a file from diffing.
    pub fn mark_too_large(&mut self, path: &Path) {
        self.info
            .to_ignore
            .insert(path.to_string_lossy().into_owned(), IgnoreReason::TooLarge);
    }

    /// Whether a file was ever recorded as too large. File size can shrink;
    /// the exclusion does not.
    pub fn was_too_large(&self, path: &Path) -> bool {
        matches!(
            self.info.to_ignore.get(path.to_string_lossy().as_ref()),
            Some(IgnoreReason::TooLarge)
        )
    }

    // =========================================================================
    // Rebaselining
    // =========================================================================

    pub fn is_rebaselining(&self) -> bool {
        self.info.rebaselining
    }

    pub fn set_rebaselining(&mut self, rebaselining: bool) {
        self.info.rebaselining = rebaselining;
    }

    /// Run number at which the current baseline generation began.
    pub fn prev_baseline_run(&self) -> u64 {
        self.info.prev_baseline_run_number
    }

    /// Start a new generation at the current run number.
    pub fn advance_baseline_run(&mut self) {
        self.info.prev_baseline_run_number = self.info.prev_run_number;
    }
}

fn seed_from_clock() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos() ^ elapsed.as_secs() as u32)
        .unwrap_or(0x9E37_79B9)
}

// =============================================================================
// Tests
// =============================================================================
