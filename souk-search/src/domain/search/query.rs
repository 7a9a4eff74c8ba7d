//! Query normalization for the two full-text backends.
//!
//! Both functions are pure: they turn arbitrary user text into an expression
//! that is syntactically valid for the target engine's query parser, or
//! `None` when no usable search terms remain ("no search constraint").

use std::fmt;

/// Backend-specific escaped representation of user search text, safe to pass
/// to the engine's native match operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build an FTS5 MATCH expression: each term quoted as a literal string
/// (embedded quotes doubled), terms joined by a space for an implicit AND.
///
/// Terms without any alphanumeric character tokenize to nothing in FTS5 and
/// are dropped; if no terms survive, returns `None`.
pub fn fts5_query(raw: &str) -> Option<NormalizedQuery> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let terms: Vec<String> = raw
        .split_whitespace()
        .filter(|word| word.chars().any(|c| c.is_alphanumeric()))
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        return None;
    }

    Some(NormalizedQuery(terms.join(" ")))
}

/// Build a PostgreSQL tsquery expression: every non-alphanumeric character
/// stripped from each term, surviving terms joined with the `&` operator.
pub fn tsquery(raw: &str) -> Option<NormalizedQuery> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect())
        .filter(|cleaned: &String| !cleaned.is_empty())
        .collect();

    if terms.is_empty() {
        return None;
    }

    Some(NormalizedQuery(terms.join(" & ")))
}
