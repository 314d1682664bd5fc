//! Run Metadata Document
//!
//! The single persisted record of everything the harness knows across runs:
//! run numbers, per-test outcomes, the strike ledger, the ignore list, and
//! the rebaseline bookkeeping. Persisted as `testRunInfo.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome records for one test file: test name → run number → status.
pub type TestFileOutcomes = BTreeMap<String, BTreeMap<String, String>>;

/// The run-metadata document.
///
/// Known fields are strongly typed; the per-test-file outcome subtrees are
/// genuinely dynamic (one per distinct test file identity) and stay at the
/// document's top level through the flattened map, so the on-disk layout is
/// stable across harness versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    /// Run number of the most recent suite invocation. Strictly increasing;
    /// every other per-run record is keyed by this value.
    pub prev_run_number: u64,

    /// Seed for the redaction cipher. Generated once at document creation,
    /// stable thereafter.
    pub random_seed: u32,

    /// Operator flag: obfuscate source content before baselining and diffing.
    #[serde(default)]
    pub redact_diffs: bool,

    /// When true, the next run folds its diffs into a fresh baseline
    /// generation instead of appending to the current one.
    #[serde(default)]
    pub rebaselining: bool,

    /// Run number at which the current baseline generation began; names the
    /// active diff archive.
    #[serde(default)]
    pub prev_baseline_run_number: u64,

    /// Kill switch: once set, recording stays off for the rest of the
    /// process. Process-scoped; reset on load.
    #[serde(default)]
    pub skip_logging: bool,

    /// Run number → wall-clock start timestamp. Append-only.
    #[serde(default)]
    pub run_times: BTreeMap<String, String>,

    /// Circular strike ledger, keyed by `runNumber % STRIKE_WINDOW`.
    #[serde(default)]
    pub strikes: BTreeMap<String, bool>,

    /// Files permanently excluded from diffing, with the reason.
    #[serde(default)]
    pub to_ignore: BTreeMap<String, IgnoreReason>,

    /// Dynamic subtrees: test file → test name → run number → status.
    #[serde(flatten)]
    pub outcomes: BTreeMap<String, TestFileOutcomes>,
}

impl RunInfo {
    /// Fresh document for a repository with no recorded history.
    pub fn new(random_seed: u32) -> Self {
        Self {
            prev_run_number: 0,
            random_seed,
            redact_diffs: false,
            rebaselining: false,
            prev_baseline_run_number: 0,
            skip_logging: false,
            run_times: BTreeMap::new(),
            strikes: BTreeMap::new(),
            to_ignore: BTreeMap::new(),
            outcomes: BTreeMap::new(),
        }
    }
}

/// Final disposition of one test in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Successful,
    Failed,
    Disabled,
    Aborted,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Successful => "SUCCESSFUL",
            TestStatus::Failed => "FAILED",
            TestStatus::Disabled => "DISABLED",
            TestStatus::Aborted => "ABORTED",
        }
    }

    /// Document value for this status, with the cause appended when present.
    pub fn render(&self, cause: Option<&str>) -> String {
        match cause {
            Some(cause) => format!("{}: {}", self.as_str(), cause),
            None => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a file is excluded from diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    #[serde(rename = "TOO_LARGE")]
    TooLarge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rendering() {
        assert_eq!(TestStatus::Successful.render(None), "SUCCESSFUL");
        assert_eq!(
            TestStatus::Failed.render(Some("expected 3, got 4")),
            "FAILED: expected 3, got 4"
        );
        assert_eq!(TestStatus::Aborted.to_string(), "ABORTED");
    }

    #[test]
    fn test_document_roundtrip_keeps_outcomes_at_top_level() {
        let mut info = RunInfo::new(42);
        info.prev_run_number = 3;
        info.outcomes
            .entry("AnagramTests".to_string())
            .or_default()
            .entry("detects simple anagrams".to_string())
            .or_default()
            .insert("3".to_string(), "SUCCESSFUL".to_string());

        let json = serde_json::to_string_pretty(&info).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        // The dynamic subtree sits beside the known fields, not nested under
        // a wrapper key.
        assert_eq!(value["prevRunNumber"], 3);
        assert_eq!(
            value["AnagramTests"]["detects simple anagrams"]["3"],
            "SUCCESSFUL"
        );

        let parsed: RunInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.prev_run_number, 3);
        assert_eq!(
            parsed.outcomes["AnagramTests"]["detects simple anagrams"]["3"],
            "SUCCESSFUL"
        );
    }

    #[test]
    fn test_ignore_reason_wire_name() {
        let json = serde_json::to_string(&IgnoreReason::TooLarge).unwrap();
        assert_eq!(json, "\"TOO_LARGE\"");
    }
}
