//! Short human-readable failure reasons from raw diagnostic output

use std::sync::OnceLock;

use regex::Regex;

/// Reported when a collaborator or stage produced nothing at all
pub const NO_OUTPUT: &str = "No output received";

const MAX_REASON_CHARS: usize = 200;

/// Known error-signal phrases, most specific first
const SIGNAL_PATTERNS: &[&str] = &[
    r"(?i)\berror:[^\n]*",
    r"(?i)\bfailed:[^\n]*",
    r"(?i)\bcannot\b[^\n]*",
    r"(?i)permission denied[^\n]*",
    r"(?i)file not found[^\n]*",
    r"(?i)no such file or directory[^\n]*",
    r"(?i)timed out[^\n]*",
    r"(?i)command not found[^\n]*",
];

fn signal_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SIGNAL_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Pull a short reason out of diagnostic text
///
/// Matches the first known error phrase, falling back to the first
/// non-blank line. The result is capped at 200 characters. Never fails.
pub fn extract_error_message(output: &str) -> String {
    if output.trim().is_empty() {
        return NO_OUTPUT.to_string();
    }

    let found = signal_patterns()
        .iter()
        .find_map(|re| re.find(output))
        .map(|m| m.as_str().trim())
        .or_else(|| output.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or(NO_OUTPUT);

    truncate(found, MAX_REASON_CHARS)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
