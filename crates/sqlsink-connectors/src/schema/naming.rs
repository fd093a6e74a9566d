//! Column and table identifier normalization.
//!
//! Nested property paths become flat column names: each segment is
//! underscored (camelCase split, special characters replaced, lowercased)
//! and the segments are joined with `__`. Names that would reach
//! [`MAX_IDENTIFIER_LEN`] get their outer segments abbreviated to initials.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Column names must stay strictly below this length.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Separator placed between the segments of a nested property path.
pub const PATH_SEPARATOR: &str = "__";

static UPPER_RUN_BEFORE_UNDERSCORE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)_([A-Z][a-z])").expect("valid regex"));
static LOWER_BEFORE_UNDERSCORE_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])_([A-Z])").expect("valid regex"));
static NON_IDENTIFIER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zA-Z_]+").expect("valid regex"));
static UPPER_RUN_BEFORE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));
static LOWER_BEFORE_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])([A-Z])").expect("valid regex"));
static CAMELIZE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|_)(.)").expect("valid regex"));
static LOWERCASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]").expect("valid regex"));

/// Splits camelCase words with `_` and lowercases the result.
///
/// `"agentOSVersion"` becomes `"agent_os_version"`.
#[must_use]
pub fn underscore(word: &str) -> String {
    let word = UPPER_RUN_BEFORE_TITLE.replace_all(word, "${1}_${2}");
    let word = LOWER_BEFORE_UPPER.replace_all(&word, "${1}_${2}");
    word.replace('-', "_").to_lowercase()
}

/// Joins `_`-separated words into `CamelCase`.
///
/// Inverse of [`underscore`] for simple names: `"client_name"` becomes
/// `"ClientName"`.
#[must_use]
pub fn camelize(word: &str) -> String {
    CAMELIZE_BOUNDARY
        .replace_all(word, |caps: &Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// Normalizes a single property name into a column-name segment.
///
/// An underscore that already sits at a camelCase boundary is doubled so
/// that `my_Field` and `myField` stay distinct.
#[must_use]
pub fn inflect_column_name(name: &str) -> String {
    let name = UPPER_RUN_BEFORE_UNDERSCORE_TITLE.replace_all(name, "${1}__${2}");
    let name = LOWER_BEFORE_UNDERSCORE_UPPER.replace_all(&name, "${1}__${2}");
    let name = NON_IDENTIFIER_RUN.replace_all(&name, "_");
    underscore(&name)
}

/// Builds the flat column name for `name` nested under `parent`.
///
/// While the joined name is at least [`MAX_IDENTIFIER_LEN`] characters
/// long, segments are abbreviated from the outermost inward. An
/// abbreviation keeps the capitals of the camelized segment, or its first
/// three characters when that would leave a single letter.
#[must_use]
pub fn flatten_key(name: &str, parent: &[String]) -> String {
    let mut segments: Vec<String> = parent
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .map(inflect_column_name)
        .collect();

    let mut index = 0;
    while joined_len(&segments) >= MAX_IDENTIFIER_LEN && index < segments.len() {
        segments[index] = abbreviate(&segments[index]);
        index += 1;
    }

    segments.join(PATH_SEPARATOR)
}

/// Derives the table name for a stream.
#[must_use]
pub fn table_name(stream: &str) -> String {
    underscore(&NON_IDENTIFIER_RUN.replace_all(stream, "_"))
}

fn abbreviate(segment: &str) -> String {
    let initials = LOWERCASE.replace_all(&camelize(segment), "").into_owned();
    if initials.chars().count() > 1 {
        initials.to_lowercase()
    } else {
        segment.chars().take(3).collect::<String>().to_lowercase()
    }
}

fn joined_len(segments: &[String]) -> usize {
    let chars: usize = segments.iter().map(|s| s.chars().count()).sum();
    chars + PATH_SEPARATOR.len() * segments.len().saturating_sub(1)
}
