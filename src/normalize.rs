use std::sync::LazyLock;

use regex::Regex;

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("separator pattern is valid"));

/// Canonical lowercase, underscore-delimited form of `text`.
///
/// Every run of characters outside `[A-Za-z0-9]` becomes a single `_`, and
/// separators at either end are dropped. Used for output file names and for
/// CSV column headers.
pub fn to_snake_case(text: &str) -> String {
    SEPARATOR_RUN
        .replace_all(text, "_")
        .trim_matches('_')
        .to_ascii_lowercase()
}
