//! Key layout of the index.
//!
//! Every key is `<prefix>:<id>`. Paths are used verbatim as ids, so a
//! `path_to_key:` key may itself contain colons; only the first one
//! separates the prefix.

/// FileRecord JSON, by index key.
pub const RECORD: &str = "record:";
/// Absolute path, by index key.
pub const KEY_TO_PATH: &str = "key_to_path:";
/// Index key, by absolute path.
pub const PATH_TO_KEY: &str = "path_to_key:";
/// Set of paths sharing a partial hash.
pub const PARTIAL: &str = "partial:";
/// Partial hash, by index key.
pub const KEY_TO_PARTIAL: &str = "key_to_partial:";
/// Full hash, by index key.
pub const KEY_TO_FULL: &str = "key_to_full:";
/// Sorted set of paths sharing a full hash.
pub const DUPES: &str = "dupes:";

pub fn record(index_key: &str) -> String {
    format!("{RECORD}{index_key}")
}

pub fn key_to_path(index_key: &str) -> String {
    format!("{KEY_TO_PATH}{index_key}")
}

pub fn path_to_key(path: &str) -> String {
    format!("{PATH_TO_KEY}{path}")
}

pub fn partial(partial_hash: &str) -> String {
    format!("{PARTIAL}{partial_hash}")
}

pub fn key_to_partial(index_key: &str) -> String {
    format!("{KEY_TO_PARTIAL}{index_key}")
}

pub fn key_to_full(index_key: &str) -> String {
    format!("{KEY_TO_FULL}{index_key}")
}

pub fn dupes(full_hash: &str) -> String {
    format!("{DUPES}{full_hash}")
}

/// Strip `prefix` from a key returned by a prefix scan.
#[must_use]
pub fn strip<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
