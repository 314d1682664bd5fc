//! Last-resort error recording.
//!
//! Invoked when anything else in the harness throws. Restores the persisted
//! archive into a fresh staging area (discarding whatever half-processed
//! state this run produced), appends a capped rendering of the error to the
//! log, and republishes so the failure itself becomes part of the history.
//! Nothing here may crash the host test process: every internal failure is
//! swallowed.

use crate::archive;
use crate::config::{HarnessConfig, ERROR_LOG_FILENAME};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;
use tracing::warn;

/// Cap on the rendered error chain, in bytes.
const MESSAGE_LIMIT: usize = 256;

/// Record a fatal error and republish the archive, best-effort.
pub(crate) fn record(config: &HarnessConfig, run_number: u64, suite_name: &str, error: &anyhow::Error) {
    warn!(run = run_number, %error, "fatal recording failure");
    // Terminal backstop: a failure while recording the failure goes nowhere.
    let _ = try_record(config, run_number, suite_name, error);
}

fn try_record(
    config: &HarnessConfig,
    run_number: u64,
    suite_name: &str,
    error: &anyhow::Error,
) -> Result<()> {
    let message = render_message(run_number, suite_name, error);

    let scratch = TempDir::new().context("Failed to create recovery workspace")?;
    let staging = scratch.path().join("publish");
    fs::create_dir_all(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;

    // Prior state, prior generations, and the existing log all come back
    // from the published archive; this run's partial work is discarded.
    archive::restore(&config.archive_path(), &staging)?;

    let log_path = staging.join(ERROR_LOG_FILENAME);
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;
    log.write_all(message.as_bytes())
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    drop(log);

    archive::publish(&staging, &config.archive_path())?;
    Ok(())
}

/// `Message <run> - <time>: <suite>` plus the error chain, capped.
fn render_message(run_number: u64, suite_name: &str, error: &anyhow::Error) -> String {
    let mut chain = String::new();
    for cause in error.chain() {
        if chain.len() >= MESSAGE_LIMIT {
            break;
        }
        chain.push_str(&cause.to_string());
        chain.push('\n');
    }
    if chain.len() > MESSAGE_LIMIT {
        let mut cut = MESSAGE_LIMIT;
        while !chain.is_char_boundary(cut) {
            cut -= 1;
        }
        chain.truncate(cut);
    }

    format!(
        "Message {} - {}: {}\n{}\n",
        run_number,
        Local::now().format("%H:%M:%S%.3f"),
        suite_name,
        chain
    )
}

// =============================================================================
// Tests
// =============================================================================
