//! Line-diff computation and the patch wire format.

use similar::{DiffTag, TextDiff};

/// Edit operation kind, after the classic LCS delta taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Change,
    Delete,
    Insert,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Change => "CHANGE",
            DeltaKind::Delete => "DELETE",
            DeltaKind::Insert => "INSERT",
        }
    }
}

/// One contiguous edit: the affected source lines and their replacements.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub kind: DeltaKind,
    pub source: Vec<String>,
    pub target: Vec<String>,
}

/// Compute the ordered edit list between two line sequences.
///
/// Unchanged regions produce nothing; an empty result means the sequences
/// are identical.
pub fn diff_lines(original: &[&str], revised: &[&str]) -> Vec<Delta> {
    let diff = TextDiff::from_slices(original, revised);
    let mut deltas = Vec::new();

    for op in diff.ops() {
        let kind = match op.tag() {
            DiffTag::Equal => continue,
            DiffTag::Replace => DeltaKind::Change,
            DiffTag::Delete => DeltaKind::Delete,
            DiffTag::Insert => DeltaKind::Insert,
        };
        deltas.push(Delta {
            kind,
            source: original[op.old_range()]
                .iter()
                .map(|line| line.to_string())
                .collect(),
            target: revised[op.new_range()]
                .iter()
                .map(|line| line.to_string())
                .collect(),
        });
    }

    deltas
}

/// Serialize an edit list: the delta count, then per delta the kind, the
/// source line count and lines, and the target line count and lines.
pub fn serialize_deltas(deltas: &[Delta]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{};\n", deltas.len()));

    for delta in deltas {
        out.push_str(delta.kind.as_str());
        out.push('\n');

        out.push_str(&format!("{},\n", delta.source.len()));
        for line in &delta.source {
            out.push_str(line);
            out.push('\n');
        }

        out.push_str(&format!("{},\n", delta.target.len()));
        for line in &delta.target {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}

// =============================================================================
// Tests
// =============================================================================
