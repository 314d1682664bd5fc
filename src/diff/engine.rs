//! Source-tree scan: baselines, patches, and rebaseline bookkeeping.

use super::patch::{diff_lines, serialize_deltas};
use crate::config::{HarnessConfig, MAX_FILE_BYTES, REBASELINE_THRESHOLD_BYTES};
use crate::redact;
use crate::store::RunStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const TOO_LARGE_SENTINEL: &str = "File too large!";
const CREATED_SENTINEL: &str = "File created!";

/// Scans the source tree against the current baseline generation.
///
/// `diffs_dir` holds the generation being built: `baselines/` snapshots and
/// `patches/` records, both created on demand.
pub struct DiffEngine<'a> {
    config: &'a HarnessConfig,
    diffs_dir: PathBuf,
}

impl<'a> DiffEngine<'a> {
    pub fn new(config: &'a HarnessConfig, diffs_dir: PathBuf) -> Self {
        Self { config, diffs_dir }
    }

    /// Walk the tree once: diff known files, baseline new ones, then update
    /// the rebaseline state for the next run.
    pub fn process_source_tree(&self, store: &mut RunStore) -> Result<()> {
        let excluded = self.config.excluded_dir_name().to_string();
        let walker = WalkDir::new(&self.config.source_root)
            .into_iter()
            .filter_entry(move |entry| {
                !(entry.file_type().is_dir() && entry.file_name().to_string_lossy() == excluded)
            });

        for entry in walker {
            let entry = entry.context("Failed to walk source tree")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(&self.config.source_suffix) {
                continue;
            }
            self.process_file(store, entry.path())?;
        }

        // A pending rebaseline completes one run after the threshold was
        // crossed, so the triggering run's patches land under the old
        // generation first.
        if store.is_rebaselining() {
            store.advance_baseline_run();
            debug!(
                generation = store.prev_baseline_run(),
                "rebaseline complete; new generation started"
            );
        }
        store.set_rebaselining(false);
        if tree_size(&self.diffs_dir.join("patches"), None)? > REBASELINE_THRESHOLD_BYTES {
            store.set_rebaselining(true);
        }

        Ok(())
    }

    /// Baseline key for a source file: relative directories joined with
    /// dots, then the file stem.
    fn baseline_key(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.config.source_root)
            .with_context(|| format!("{} is outside the source root", path.display()))?;

        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name
            .strip_suffix(&self.config.source_suffix)
            .unwrap_or(&name)
            .to_string();

        let package = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_default();

        Ok(if package.is_empty() {
            stem
        } else {
            format!("{}.{}", package, stem)
        })
    }

    fn process_file(&self, store: &mut RunStore, path: &Path) -> Result<()> {
        let key = self.baseline_key(path)?;
        let baseline_path = self.diffs_dir.join("baselines").join(&key);

        if baseline_path.exists() {
            self.diff_against_baseline(store, path, &baseline_path, &key)
        } else {
            self.create_baseline(store, path, &baseline_path, &key)
        }
    }

    fn diff_against_baseline(
        &self,
        store: &mut RunStore,
        source: &Path,
        baseline: &Path,
        key: &str,
    ) -> Result<()> {
        let content;
        if self.is_or_was_too_large(store, baseline)? || self.is_or_was_too_large(store, source)? {
            content = TOO_LARGE_SENTINEL.to_string();
        } else {
            let baseline_text = std::fs::read_to_string(baseline)
                .with_context(|| format!("Failed to read baseline {}", baseline.display()))?;
            let source_text = std::fs::read_to_string(source)
                .with_context(|| format!("Failed to read {}", source.display()))?;

            let original: Vec<&str> = baseline_text.lines().collect();
            // The baseline was redacted at creation; redaction is one-way,
            // so the current content is redacted to match.
            let revised_owned: Vec<String> = if store.redact_diffs() {
                redact::redact_lines(&source_text.lines().collect::<Vec<_>>(), store.seed())
            } else {
                source_text.lines().map(str::to_string).collect()
            };
            let revised: Vec<&str> = revised_owned.iter().map(String::as_str).collect();

            let deltas = diff_lines(&original, &revised);
            if deltas.is_empty() {
                return Ok(());
            }
            content = serialize_deltas(&deltas);
        }

        self.write_patch(store, key, &content)?;
        debug!(file = %source.display(), "recorded diff patch");
        Ok(())
    }

    fn create_baseline(
        &self,
        store: &mut RunStore,
        source: &Path,
        baseline: &Path,
        key: &str,
    ) -> Result<()> {
        // No baseline for oversized files: the ignore list keeps them from
        // being re-read every run.
        if self.is_or_was_too_large(store, source)? {
            return Ok(());
        }

        let mut content = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        if store.redact_diffs() {
            content = redact::redact(&content, store.seed());
        }

        if let Some(parent) = baseline.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(baseline, content)
            .with_context(|| format!("Failed to write baseline {}", baseline.display()))?;

        // Creation patch; written every run a file is newly baselined, the
        // first one being the true creation.
        self.write_patch(store, key, CREATED_SENTINEL)?;
        debug!(file = %source.display(), "baselined new file");
        Ok(())
    }

    fn write_patch(&self, store: &RunStore, key: &str, content: &str) -> Result<()> {
        let patch_path = self
            .diffs_dir
            .join("patches")
            .join(format!("{}_{}", key, store.run_number()));
        if let Some(parent) = patch_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&patch_path, content)
            .with_context(|| format!("Failed to write patch {}", patch_path.display()))?;
        Ok(())
    }

    /// Size check that remembers: once a file crosses the ceiling it stays
    /// excluded even if it later shrinks.
    fn is_or_was_too_large(&self, store: &mut RunStore, path: &Path) -> Result<bool> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        let larger = size >= MAX_FILE_BYTES || store.was_too_large(path);
        if larger {
            store.mark_too_large(path);
        }
        Ok(larger)
    }
}

/// Total size of regular files under `root`, optionally skipping one
/// directory name. Zero if `root` does not exist.
pub fn tree_size(root: &Path, excluded_dir: Option<&str>) -> Result<u64> {
    if !root.exists() {
        return Ok(0);
    }

    let excluded = excluded_dir.map(str::to_string);
    let walker = WalkDir::new(root).into_iter().filter_entry(move |entry| {
        match &excluded {
            Some(excluded) => {
                !(entry.file_type().is_dir()
                    && entry.file_name().to_string_lossy() == excluded.as_str())
            }
            None => true,
        }
    });

    let mut total = 0;
    for entry in walker {
        let entry = entry.context("Failed to walk directory")?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .context("Failed to read file metadata")?
                .len();
        }
    }
    Ok(total)
}

// =============================================================================
// Tests
// =============================================================================
