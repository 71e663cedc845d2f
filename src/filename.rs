//! Title/author guesses from bare filenames.
//!
//! Used when embedded tags are missing. The result is a search hint, not
//! authoritative metadata: an empty author means "ask a catalog".

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Structural patterns tried in order against the whole base name.
static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // AUTHOR - TITLE
        r"^(?P<author>.+?) - (?P<title>.+)$",
        // TITLE by AUTHOR
        r"^(?P<title>.+?) by (?P<author>.+)$",
        // TITLE (AUTHOR)
        r"^(?P<title>.+?) \((?P<author>.+?)\)$",
        // AUTHOR: TITLE
        r"^(?P<author>.+?): (?P<title>.+)$",
        // AUTHOR_TITLE, no spaces; a purely numeric tail is a track number, not a title
        r"^(?P<author>[^\s_()]+)_+(?P<title>[^\s()]*[^\s\d_()][^\s()]*)$",
        // TITLE_(AUTHOR)
        r"^(?P<title>[^\s]+?)_+\((?P<author>[^\s()]+)\)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\s]\d+$").unwrap());

fn strip_numeric_suffix(title: &str) -> String {
    NUMERIC_SUFFIX.replace(title.trim(), "").trim().to_string()
}

/// Guess `(title, author)` from a filename. `author` is empty when no
/// pattern applies.
pub fn parse(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    let base_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());

    if let Some(caps) = PATTERNS.iter().find_map(|re| re.captures(&base_name)) {
        let author = caps.name("author").map(|m| m.as_str().trim()).unwrap_or("");
        let title = strip_numeric_suffix(caps.name("title").map(|m| m.as_str()).unwrap_or(""));
        if !author.is_empty() && !title.is_empty() {
            return (title, author.to_string());
        }
    }

    debug!("No author extracted from filename: {}", filename);
    (strip_numeric_suffix(&base_name), String::new())
}
