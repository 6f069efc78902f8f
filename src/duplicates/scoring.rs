//! Canonical-copy scoring.
//!
//! Lower scores sort first, and the first member of a group is the copy that
//! is kept. Paths carrying more `H:MM[:SS]` annotations win outright; among
//! equal counts the longer basename wins; remaining ties fall back to the
//! sorted set's lexicographic member order.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Weight of one timestamp in a score.
pub const TIMESTAMP_WEIGHT: u64 = 10_000;

/// Basename lengths are clamped to this many bytes.
pub const MAX_BASENAME_LEN: u64 = 1024;

// One extra timestamp must outweigh any basename.
const _: () = assert!(TIMESTAMP_WEIGHT > MAX_BASENAME_LEN);

/// `H:MM` or `H:MM:SS`, not glued to a preceding letter or digit.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9A-Za-z])([0-9]{1,2}):([0-9]{1,2})(?::([0-9]{1,2}))?")
        .unwrap_or_else(|e| panic!("invalid timestamp pattern: {e}"))
});

/// Distinct timestamps found anywhere in `path`, each component padded to
/// two digits, shortest first and then lexicographic.
#[must_use]
pub fn extract_timestamps(path: &str) -> Vec<String> {
    let found: BTreeSet<String> = TIMESTAMP_RE
        .captures_iter(path)
        .map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .map(|part| format!("{:0>2}", part.as_str()))
                .collect::<Vec<_>>()
                .join(":")
        })
        .collect();

    let mut timestamps: Vec<String> = found.into_iter().collect();
    timestamps.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    timestamps
}

/// Number of distinct timestamps in `path`.
#[must_use]
pub fn timestamp_count(path: &str) -> usize {
    extract_timestamps(path).len()
}

/// Basename length in bytes, clamped to [`MAX_BASENAME_LEN`].
#[must_use]
pub fn basename_len(path: &str) -> u64 {
    let len = Path::new(path)
        .file_name()
        .map_or(0, |name| name.as_encoded_bytes().len() as u64);
    len.min(MAX_BASENAME_LEN)
}

/// Sort score of `path` inside its duplicate group.
#[must_use]
pub fn selection_score(path: &str) -> f64 {
    let weight = timestamp_count(path) as u64 * TIMESTAMP_WEIGHT + basename_len(path);
    -(weight as f64)
}
