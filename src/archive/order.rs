//! Publish ordering for archive entries.

use crate::config::{ERROR_LOG_FILENAME, RUN_INFO_FILENAME};
use regex::Regex;
use std::cmp::Ordering;

/// Sort staged filenames into publish order: the state document first, the
/// error log second, then diff generations with even generation numbers
/// ahead of odd, older generations first within a parity class.
pub fn sort_for_publish(names: &mut [String]) {
    names.sort_by(|a, b| compare(a, b));
}

fn compare(a: &str, b: &str) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

fn rank(name: &str) -> (u8, u8, u64) {
    if name == RUN_INFO_FILENAME {
        return (0, 0, 0);
    }
    if name == ERROR_LOG_FILENAME {
        return (1, 0, 0);
    }
    if super::is_generation_zip(name) {
        let generation = first_number(name).unwrap_or(0);
        return (2, (generation % 2) as u8, generation);
    }
    (3, 0, 0)
}

/// First run of digits in `name`, if any.
fn first_number(name: &str) -> Option<u64> {
    let re = Regex::new(r"\d+").unwrap();
    re.find(name).and_then(|m| m.as_str().parse().ok())
}

// =============================================================================
// Tests
// =============================================================================
