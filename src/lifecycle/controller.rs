//! RunLogger - hook sequencing across one suite run.

use super::fatal;
use crate::archive;
use crate::config::{
    HarnessConfig, ERROR_LOG_FILENAME, HOOK_BUDGET, MAX_ARCHIVE_BYTES, MAX_REPO_BYTES,
    RUN_INFO_FILENAME, TEARDOWN_BUDGET,
};
use crate::diff::{self, DiffEngine};
use crate::models::TestStatus;
use crate::store::RunStore;
use crate::timing::{self, HookTimer};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Live workspace for one suite run.
struct Session {
    scratch: TempDir,
    store: RunStore,
    timer: HookTimer,
    suite_name: String,
}

impl Session {
    fn store_dir(&self) -> PathBuf {
        self.scratch.path().join("store")
    }

    fn diffs_dir(&self) -> PathBuf {
        self.scratch.path().join("diffs")
    }

    fn staging_dir(&self) -> PathBuf {
        self.scratch.path().join("publish")
    }
}

enum Phase {
    Uninitialized,
    Active(Box<Session>),
    /// A size ceiling was breached or initialization failed; the run is not
    /// recorded at all.
    Disabled,
    Closed,
}

/// The lifecycle controller.
///
/// Constructed once per test process and threaded through the collaborator's
/// hooks. No hook ever panics or returns an error: anything fatal routes to
/// the error log and disables recording for the rest of the run. The
/// student's suite outcome is never affected; at worst, telemetry for the
/// run is incomplete.
pub struct RunLogger {
    config: HarnessConfig,
    phase: Phase,
    closed: AtomicBool,
    fatal_logged: bool,
}

impl RunLogger {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            phase: Phase::Uninitialized,
            closed: AtomicBool::new(false),
            fatal_logged: false,
        }
    }

    /// Suite start. The first call restores the archive, loads the store,
    /// and opens the run; later calls only update the suite identity used
    /// in error reports.
    pub fn on_suite_start(&mut self, display_name: &str) {
        if matches!(self.phase, Phase::Uninitialized) {
            match self.initialize(display_name) {
                Ok(phase) => self.phase = phase,
                Err(error) => {
                    self.phase = Phase::Disabled;
                    self.log_fatal(0, display_name, error);
                }
            }
            return;
        }

        if let Phase::Active(session) = &mut self.phase {
            session.timer.start();
            session.suite_name = display_name.to_string();
            let elapsed = session.timer.stop();
            timing::evaluate(&mut session.store, elapsed, HOOK_BUDGET);
        }
    }

    /// Record ABORTED for a test before it runs, so a crash mid-test shows
    /// up as aborted rather than silently missing.
    pub fn on_test_default(&mut self, test_file: &str, test_name: &str) {
        self.record_event(|store| {
            store.record_status(test_file, test_name, TestStatus::Aborted, None);
            Ok(())
        });
    }

    /// Overwrite a test's default with its final outcome.
    pub fn on_test_outcome(
        &mut self,
        test_file: &str,
        test_name: &str,
        status: TestStatus,
        cause: Option<&str>,
    ) {
        self.record_event(|store| {
            store.record_status(test_file, test_name, status, cause);
            Ok(())
        });
    }

    /// Suite end. Idempotent: the first of the normal call and the
    /// drop-time fallback performs the close, the other is a no-op.
    pub fn on_suite_end(&mut self) {
        self.close();
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    fn initialize(&self, display_name: &str) -> Result<Phase> {
        let archive_path = self.config.archive_path();

        // Cheapest possible trip: a huge repository or archive is not even
        // restored.
        let repo_bytes =
            diff::tree_size(&self.config.source_root, Some(self.config.excluded_dir_name()))?;
        let archive_bytes = fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        if repo_bytes > MAX_REPO_BYTES || archive_bytes >= MAX_ARCHIVE_BYTES {
            warn!(
                repo_bytes,
                archive_bytes, "size ceiling exceeded; recording disabled for this run"
            );
            return Ok(Phase::Disabled);
        }

        let mut timer = HookTimer::new();
        timer.start();

        let scratch = TempDir::new().context("Failed to create scratch workspace")?;
        let store_dir = scratch.path().join("store");
        fs::create_dir_all(&store_dir)
            .with_context(|| format!("Failed to create {}", store_dir.display()))?;
        archive::restore(&archive_path, &store_dir)?;

        // The log always exists in the published archive, even when empty.
        let error_log = store_dir.join(ERROR_LOG_FILENAME);
        if !error_log.exists() {
            fs::write(&error_log, "")
                .with_context(|| format!("Failed to create {}", error_log.display()))?;
        }

        let mut store = RunStore::load(&store_dir.join(RUN_INFO_FILENAME))?;
        store.increment_run_number();
        store.record_run_time(Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        // Only the prior occupant of this slot counts against history; this
        // run must not be judged by its own leftover.
        store.clear_current_strike();
        debug!(run = store.run_number(), "run opened");

        let mut session = Session {
            scratch,
            store,
            timer,
            suite_name: display_name.to_string(),
        };
        let elapsed = session.timer.stop();
        timing::evaluate(&mut session.store, elapsed, HOOK_BUDGET);
        Ok(Phase::Active(Box::new(session)))
    }

    // =========================================================================
    // Per-Test Events
    // =========================================================================

    fn record_event(&mut self, record: impl FnOnce(&mut RunStore) -> Result<()>) {
        let failure = {
            let Phase::Active(session) = &mut self.phase else {
                return;
            };
            session.timer.start();
            if session.store.skip_logging() {
                session.timer.stop();
                return;
            }
            match record(&mut session.store) {
                Ok(()) => {
                    let elapsed = session.timer.stop();
                    timing::evaluate(&mut session.store, elapsed, HOOK_BUDGET);
                    None
                }
                Err(error) => {
                    session.timer.stop();
                    session.store.set_skip_logging();
                    Some((session.store.run_number(), session.suite_name.clone(), error))
                }
            }
        };

        if let Some((run_number, suite_name, error)) = failure {
            self.log_fatal(run_number, &suite_name, error);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    fn close(&mut self) {
        // One-shot: the normal suite-end call races the drop-time fallback,
        // and the first caller wins.
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        let Phase::Active(mut session) = phase else {
            return;
        };
        if self.fatal_logged {
            // The error logger already published; the scratch workspace is
            // dropped below and nothing else may change.
            return;
        }

        let result = self.finish_run(&mut session);
        if let Err(error) = result {
            session.timer.stop();
            session.store.set_skip_logging();
            let run_number = session.store.run_number();
            let suite_name = session.suite_name.clone();
            self.log_fatal(run_number, &suite_name, error);
        }
        // The scratch TempDir is deleted when `session` drops here.
    }

    fn finish_run(&self, session: &mut Session) -> Result<()> {
        session.timer.start();

        let store_dir = session.store_dir();
        let staging = session.staging_dir();
        fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        let archive_path = self.config.archive_path();

        if session.store.skip_logging() {
            // Tripped earlier in the run: no further state mutation, but the
            // restored contents are still published best-effort.
            Self::stage_passthrough(session, &staging, None)?;
            archive::publish(&staging, &archive_path)?;
            return Ok(());
        }

        // Unpack the current generation's diffs, unless a rebaseline starts
        // this generation fresh.
        let diffs_dir = session.diffs_dir();
        let generation_zip =
            store_dir.join(archive::generation_zip_name(session.store.prev_baseline_run()));
        if generation_zip.exists() && !session.store.is_rebaselining() {
            archive::extract_generation_zip(&generation_zip, &diffs_dir)?;
        }

        let engine = DiffEngine::new(&self.config, diffs_dir.clone());
        engine.process_source_tree(&mut session.store)?;

        // The generation may have just advanced; the new zip takes its name.
        archive::build_generation_zip(&diffs_dir, &staging, session.store.prev_baseline_run())?;

        // Prior generations and the error log carry through unchanged.
        let current_name = archive::generation_zip_name(session.store.prev_baseline_run());
        Self::stage_passthrough(session, &staging, Some(current_name.as_str()))?;

        // Strike accounting must land before the document is saved, or a
        // slow teardown would go unrecorded.
        let elapsed = session.timer.stop();
        timing::evaluate(&mut session.store, elapsed, TEARDOWN_BUDGET);

        session.store.save_to(&staging.join(RUN_INFO_FILENAME))?;
        archive::publish(&staging, &archive_path)?;
        debug!(run = session.store.run_number(), "run published");
        Ok(())
    }

    /// Move restored publishable files from the store dir into staging,
    /// optionally skipping the zip being rebuilt this run.
    fn stage_passthrough(
        session: &Session,
        staging: &std::path::Path,
        skip: Option<&str>,
    ) -> Result<()> {
        let store_dir = session.store_dir();
        for entry in fs::read_dir(&store_dir)
            .with_context(|| format!("Failed to read {}", store_dir.display()))?
        {
            let entry = entry.context("Failed to read restored entry")?;
            if !entry.file_type().context("Failed to stat restored entry")?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let passthrough = name == ERROR_LOG_FILENAME
                || name == RUN_INFO_FILENAME
                || archive::is_generation_zip(&name);
            if !passthrough || skip == Some(name.as_str()) {
                continue;
            }
            // The diff pipeline writes its own document; the restored copy
            // only travels when nothing newer will be saved.
            if skip.is_some() && name == RUN_INFO_FILENAME {
                continue;
            }
            fs::rename(entry.path(), staging.join(&name))
                .with_context(|| format!("Failed to stage {}", name))?;
        }
        Ok(())
    }

    fn log_fatal(&mut self, run_number: u64, suite_name: &str, error: anyhow::Error) {
        // Fires at most once per process; a second fatal error is swallowed.
        if self.fatal_logged {
            return;
        }
        self.fatal_logged = true;
        fatal::record(&self.config, run_number, suite_name, &error);
    }
}

impl Drop for RunLogger {
    /// Process-exit fallback: if the suite never reached its normal end,
    /// dropping the logger performs the close instead.
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_project() -> (TempDir, HarnessConfig) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("src");
        fs::create_dir_all(root.join("euclid")).unwrap();
        fs::write(root.join("euclid/euclid.rs"), "fn gcd() {}\n").unwrap();
        let config = HarnessConfig::new(&root, ".rs", root.join("grading"));
        fs::create_dir_all(&config.harness_dir).unwrap();
        (temp, config)
    }

    fn read_published_info(config: &HarnessConfig) -> serde_json::Value {
        let restored = TempDir::new().unwrap();
        archive::restore(&config.archive_path(), restored.path()).unwrap();
        let content = fs::read_to_string(restored.path().join(RUN_INFO_FILENAME)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_full_run_publishes_archive() {
        let (_temp, config) = setup_project();

        let mut logger = RunLogger::new(config.clone());
        logger.on_suite_start("EuclidTests");
        logger.on_test_default("EuclidTests", "computes gcd");
        logger.on_test_outcome("EuclidTests", "computes gcd", TestStatus::Successful, None);
        logger.on_suite_end();

        let info = read_published_info(&config);
        assert_eq!(info["prevRunNumber"], 1);
        assert_eq!(info["EuclidTests"]["computes gcd"]["1"], "SUCCESSFUL");
        assert!(info["runTimes"]["1"].is_string());
    }

    #[test]
    fn test_drop_acts_as_exit_fallback() {
        let (_temp, config) = setup_project();

        {
            let mut logger = RunLogger::new(config.clone());
            logger.on_suite_start("EuclidTests");
            logger.on_test_default("EuclidTests", "computes gcd");
            // No on_suite_end: the suite was cut short.
        }

        let info = read_published_info(&config);
        assert_eq!(info["prevRunNumber"], 1);
        assert_eq!(info["EuclidTests"]["computes gcd"]["1"], "ABORTED");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_temp, config) = setup_project();

        let mut logger = RunLogger::new(config.clone());
        logger.on_suite_start("EuclidTests");
        logger.on_suite_end();
        logger.on_suite_end();
        drop(logger);

        let info = read_published_info(&config);
        assert_eq!(info["prevRunNumber"], 1);
    }

    #[test]
    fn test_run_numbers_increase_across_processes() {
        let (_temp, config) = setup_project();

        for expected in 1..=3u64 {
            let mut logger = RunLogger::new(config.clone());
            logger.on_suite_start("EuclidTests");
            logger.on_suite_end();

            let info = read_published_info(&config);
            assert_eq!(info["prevRunNumber"], expected);
        }
    }

    #[test]
    fn test_oversized_repo_disables_run_without_touching_archive() {
        let (temp, config) = setup_project();
        fs::write(
            temp.path().join("src/euclid/blob.rs"),
            "x".repeat((MAX_REPO_BYTES + 1) as usize),
        )
        .unwrap();

        let mut logger = RunLogger::new(config.clone());
        logger.on_suite_start("EuclidTests");
        logger.on_test_default("EuclidTests", "computes gcd");
        logger.on_suite_end();

        assert!(!config.archive_path().exists());
    }

    #[test]
    fn test_hooks_before_suite_start_are_noops() {
        let (_temp, config) = setup_project();

        let mut logger = RunLogger::new(config.clone());
        logger.on_test_default("EuclidTests", "computes gcd");
        logger.on_test_outcome("EuclidTests", "computes gcd", TestStatus::Failed, None);
        logger.on_suite_end();

        assert!(!config.archive_path().exists());
    }

    #[test]
    fn test_second_suite_start_updates_identity_only() {
        let (_temp, config) = setup_project();

        let mut logger = RunLogger::new(config.clone());
        logger.on_suite_start("EuclidTests");
        logger.on_suite_start("SearchTests");
        logger.on_test_outcome("SearchTests", "finds target", TestStatus::Successful, None);
        logger.on_suite_end();

        let info = read_published_info(&config);
        // One run, not two.
        assert_eq!(info["prevRunNumber"], 1);
        assert_eq!(info["SearchTests"]["finds target"]["1"], "SUCCESSFUL");
    }
}
