//! Title cleanup applied before lyrics lookup and duplicate detection.

use once_cell::sync::Lazy;
use regex::Regex;

// Patterns are compile-time constants; a failure here is a programming error.
#[allow(clippy::expect_used)]
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[].*?[\)\]]").expect("valid bracket pattern"));

#[allow(clippy::expect_used)]
static SEGMENT_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*-\s*").expect("valid separator pattern"));

#[allow(clippy::expect_used)]
static FILLER_SUFFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)\bfrom\s+".+?"\s+soundtrack\b"#,
        r"(?i)\bfrom\s+.+?\s+soundtrack\b",
        r"(?i)\s+\(album version\)",
        r"(?i)\s+\(radio edit\)",
        r"(?i)\s+\(remix\)",
        r"(?i)\s+\(edit\)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid suffix pattern"))
    .collect()
});

#[allow(clippy::expect_used)]
static CJK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]+").expect("valid CJK pattern"));

/// Normalize a raw track title into a lookup key.
///
/// Removes bracketed annotations, keeps only the segment before the first
/// ` - `, drops filler suffixes such as `from "X" soundtrack`, strips CJK
/// ideographs, straightens curly quotes and trims.
#[must_use]
pub fn normalize_track_name(raw: &str) -> String {
    let without_brackets = BRACKETED.replace_all(raw, "");
    let head = SEGMENT_SEPARATOR
        .split(&without_brackets)
        .next()
        .unwrap_or_default()
        .to_string();

    let mut track = head;
    for suffix in FILLER_SUFFIXES.iter() {
        track = suffix.replace_all(&track, "").into_owned();
    }

    straighten_quotes(&strip_cjk(&track)).trim().to_string()
}

/// Remove CJK unified ideographs, leaving the rest of the text untouched
#[must_use]
pub fn strip_cjk(text: &str) -> String {
    CJK.replace_all(text, "").into_owned()
}

fn straighten_quotes(text: &str) -> String {
    text.replace('\u{2019}', "'")
        .replace(['\u{201c}', '\u{201d}'], "\"")
}
