//! URL slug helpers. Pure string functions, no I/O.

use std::sync::LazyLock;

use regex::Regex;

// `\w` here is ASCII word characters only; `\s` stays Unicode whitespace.
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("valid regex"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));
static EDGE_HYPHENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-+|-+$").expect("valid regex"));
static VALID_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"));

pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = DISALLOWED.replace_all(lowered.trim(), "");
    let hyphenated = SEPARATOR_RUNS.replace_all(&stripped, "-");
    EDGE_HYPHENS.replace_all(&hyphenated, "").into_owned()
}

/// Slug for `title` that collides with none of `existing`, suffixing `-1`,
/// `-2`, ... as needed.
pub fn create_unique_slug<S: AsRef<str>>(title: &str, existing: &[S]) -> String {
    let base = slugify(title);
    let taken = |candidate: &str| existing.iter().any(|s| s.as_ref() == candidate);
    if !taken(&base) {
        return base;
    }
    (1u64..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

pub fn validate_slug(slug: &str) -> bool {
    VALID_SLUG.is_match(slug)
}
