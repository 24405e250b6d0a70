//! Text cleanup for LSI descriptive fields.

use regex::Regex;
use std::sync::OnceLock;

/// LSI byte limit for the short description column.
pub const SHORT_DESCRIPTION_MAX_BYTES: usize = 350;

/// LSI limit for the annotation / summary column.
pub const ANNOTATION_MAX_CHARS: usize = 4000;

const ELLIPSIS: &str = "...";

/// Truncate `text` so its UTF-8 length is at most `max_bytes`.
///
/// Text already within the limit is returned unchanged. Longer text is cut at
/// the last word boundary that leaves room for an ellipsis, or at the last
/// char boundary when there is no usable word break.
pub fn validate_and_truncate_short_description(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    if max_bytes <= ELLIPSIS.len() {
        return truncate_to_bytes(text, max_bytes).to_string();
    }

    let budget = max_bytes - ELLIPSIS.len();
    let head = truncate_to_bytes(text, budget);
    let cut = match head.rfind(char::is_whitespace) {
        // keep at least half the budget before falling back to a word cut
        Some(idx) if idx >= budget / 2 => &head[..idx],
        _ => head,
    };
    let cut = cut.trim_end_matches(|c: char| c.is_whitespace() || c == ',' || c == ';' || c == ':');
    format!("{}{}", cut, ELLIPSIS)
}

/// Longest prefix of `text` that fits in `max_bytes` on a char boundary.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove HTML tags and decode the handful of entities LLM output uses.
pub fn strip_html(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    let stripped = re.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    collapse_whitespace(&decoded)
}

/// Escape text for the annotation column, which accepts limited HTML.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Remove markdown emphasis and heading markers.
pub fn strip_markdown(text: &str) -> String {
    static MD: OnceLock<Regex> = OnceLock::new();
    let re = MD.get_or_init(|| Regex::new(r"(\*\*|__|\*|`|^#+\s*)").expect("static regex"));
    text.lines()
        .map(|line| re.replace_all(line, "").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate on a char count, appending an ellipsis when cut. Limits too small
/// for the ellipsis get a bare cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
