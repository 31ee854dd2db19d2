//! Output normalization and test case verification
//!
//! Comparison is strict equality of normalized outputs. There is no numeric
//! tolerance and no whitespace-insensitive diffing beyond normalization.

use serde::Serialize;

/// Canonicalize raw program output for comparison.
///
/// Rules: trim leading/trailing whitespace, unify CRLF/CR line endings to LF,
/// strip whitespace left trailing on the final line. Idempotent.
pub fn normalize(text: &str) -> String {
    text.trim()
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim_end()
        .to_string()
}

/// Verification of a single test case
#[derive(Debug, Clone, Serialize)]
pub struct CaseCheck {
    pub passed: bool,
    pub actual: String,
    pub expected: String,
}

/// Compare actual program output against the expected output
pub fn check_case(actual_raw: &str, expected_raw: &str) -> CaseCheck {
    let actual = normalize(actual_raw);
    let expected = normalize(expected_raw);

    CaseCheck {
        passed: actual == expected,
        actual,
        expected,
    }
}

/// Percentage of passed cases, rounded to the nearest integer.
/// An empty result set scores 0.
pub fn score(results: &[bool]) -> u32 {
    if results.is_empty() {
        return 0;
    }
    let passed = results.iter().filter(|&&passed| passed).count();
    ((passed as f64 / results.len() as f64) * 100.0).round() as u32
}
