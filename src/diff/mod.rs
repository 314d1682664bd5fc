//! Baseline & Diff Engine
//!
//! Walks the student source tree once per run, keeps one baseline snapshot
//! per file per generation, and serializes line diffs as patch records:
//! - known files are diffed against their baseline
//! - new files are baselined (with a creation patch)
//! - oversized files are sentineled via the persisted ignore list
//! - cumulative patch volume schedules the next rebaseline

mod engine;
mod patch;

pub use engine::{tree_size, DiffEngine};
pub use patch::{diff_lines, serialize_deltas, Delta, DeltaKind};
