//! Text cleanup for raw model output.
//!
//! Search-augmented models decorate answers with citation markers and
//! markdown even when told not to. Everything user-visible goes through
//! [`cleanup_model_text`] before rendering or caching.

use regex::Regex;
use std::sync::OnceLock;

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\[\d+\]").unwrap())
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").unwrap())
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*(.+?)\*").unwrap())
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap())
}

fn multispace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]{2,}").unwrap())
}

fn space_before_punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([,.!?])").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap())
}

/// Strip citation markers, markdown emphasis and header prefixes, and
/// normalize whitespace. Returns an empty string for empty input.
pub fn cleanup_model_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let cleaned = citation_re().replace_all(text, "");
    let cleaned = bold_re().replace_all(&cleaned, "$1");
    let cleaned = emphasis_re().replace_all(&cleaned, "$1");
    let cleaned = header_re().replace_all(&cleaned, "");
    let cleaned = multispace_re().replace_all(&cleaned, " ");
    let cleaned = space_before_punct_re().replace_all(&cleaned, "$1");
    cleaned.trim().to_string()
}

/// Plain text with markup tags removed, for length heuristics.
pub fn strip_markup(text: &str) -> String {
    tag_re().replace_all(text, "").to_string()
}

/// Escape text destined for the allow-listed HTML markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
