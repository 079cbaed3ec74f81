//! Sensitive-output filter.
//!
//! Generated code is suppressed entirely when it contains anything that looks
//! like an API key or credential assignment. Fail-closed: partial redaction
//! of code risks leaving exploitable fragments, and a dropped completion is
//! cheap for the client to recover from.

use once_cell::sync::Lazy;
use regex::Regex;

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(sk-[a-zA-Z0-9]{20,}|password\s*[:=]|api[_-]?key|secret[_-]?key)")
        .unwrap_or_else(|e| unreachable!("forbidden pattern is a valid regex: {e}"))
});

/// Returns the text unchanged, or the empty string when a forbidden pattern
/// matches anywhere in it.
pub fn filter_sensitive(text: &str) -> String {
    if FORBIDDEN.is_match(text) {
        String::new()
    } else {
        text.to_string()
    }
}
