//! Common utilities and helper functions

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Collapse runs of whitespace and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Redact everything but the first characters of a secret for logging
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}
