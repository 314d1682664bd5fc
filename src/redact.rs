//! One-way obfuscation of source content.
//!
//! Runs of ASCII alphanumerics collapse to a single deterministic substitute
//! repeated for the length of the run; everything else passes through. Line
//! structure and token boundaries survive, so line diffs still detect *that*
//! something changed without revealing *what*. Resists casual inspection
//! only; this is not cryptography.

const ALPHANUM_SPAN: u32 = 62;

// Maps 0-61 onto ['0'-'9', 'A'-'Z', 'a'-'z'].
fn index_to_alphanum(index: u32) -> char {
    if index < 10 {
        return (b'0' + index as u8) as char;
    }
    let index = index - 10;
    if index < 26 {
        return (b'A' + index as u8) as char;
    }
    (b'a' + (index - 26) as u8) as char
}

// Bit-mix the seed with the run's first character to pick the substitute.
fn substitute_for(c: char, seed: u32) -> char {
    let mut x = seed ^ (c as u32);
    x = x.wrapping_mul(0x27D4_EB2D);
    x ^= x >> 15;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    index_to_alphanum(x % ALPHANUM_SPAN)
}

/// Redact one string. Deterministic for a fixed `(text, seed)` pair.
pub fn redact(text: &str, seed: u32) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run_substitute: Option<char> = None;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            let substitute = *run_substitute.get_or_insert_with(|| substitute_for(c, seed));
            out.push(substitute);
        } else {
            run_substitute = None;
            out.push(c);
        }
    }

    out
}

/// Redact each line independently.
pub fn redact_lines<S: AsRef<str>>(lines: &[S], seed: u32) -> Vec<String> {
    lines
        .iter()
        .map(|line| redact(line.as_ref(), seed))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_fixed_input_and_seed() {
        let text = "fn gcd(a: u64, b: u64) -> u64 {";
        assert_eq!(redact(text, 12345), redact(text, 12345));
    }

    #[test]
    fn test_runs_collapse_to_one_symbol() {
        let redacted = redact("hello world", 7);
        let chars: Vec<char> = redacted.chars().collect();

        assert_eq!(chars.len(), 11);
        // Each run is one repeated symbol.
        assert!(chars[0..5].iter().all(|c| *c == chars[0]));
        assert!(chars[6..11].iter().all(|c| *c == chars[6]));
        assert_eq!(chars[5], ' ');
        assert!(chars[0].is_ascii_alphanumeric());
    }

    #[test]
    fn test_non_alphanumerics_pass_through() {
        let redacted = redact("let x = (a + b) * 2; // sum", 99);
        let original_marks: String = "let x = (a + b) * 2; // sum"
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric())
            .collect();
        let redacted_marks: String = redacted
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric())
            .collect();
        assert_eq!(original_marks, redacted_marks);
    }

    #[test]
    fn test_line_structure_preserved() {
        let text = "first line\nsecond line\n\nthird";
        let redacted = redact(text, 41);
        assert_eq!(redacted.lines().count(), text.lines().count());
        assert_eq!(redacted.len(), text.len());
    }

    #[test]
    fn test_seed_varies_substitution() {
        let outputs: std::collections::BTreeSet<String> =
            (0u32..100).map(|seed| redact("target", seed)).collect();
        assert!(outputs.len() > 1);
    }

    #[test]
    fn test_redact_lines_matches_per_line_redaction() {
        let lines = ["alpha", "beta gamma"];
        let redacted = redact_lines(&lines, 13);
        assert_eq!(redacted[0], redact("alpha", 13));
        assert_eq!(redacted[1], redact("beta gamma", 13));
    }
}
