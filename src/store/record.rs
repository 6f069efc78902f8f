//! The per-file record kept in the index.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One indexed file.
///
/// `index_key` is derived from `path` alone and never changes for a given
/// path. The hashes are only present once the file was indexed with
/// hashing enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path as indexed
    pub path: String,
    /// Size in bytes at index time
    pub size: u64,
    /// Modification time at index time
    pub mod_time: DateTime<Utc>,
    /// Primary key, see [`index_key`]
    pub index_key: String,
    /// BLAKE3 of the first 100 KiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_hash: Option<String>,
    /// BLAKE3 of the whole file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_hash: Option<String>,
}

impl FileRecord {
    /// Whether both hashes are present.
    #[must_use]
    pub fn is_hashed(&self) -> bool {
        self.partial_hash.is_some() && self.full_hash.is_some()
    }
}

/// Lowercase hex SHA-256 of a path string.
///
/// Collisions are not handled: two paths with the same digest would share
/// one record.
#[must_use]
pub fn index_key(path: &str) -> String {
    format!("{:x}", Sha256::digest(path.as_bytes()))
}

/// String form of a path as used in store keys and records.
///
/// `None` when the path is not valid UTF-8. Such paths are never stored: a
/// lossy string would name a file that does not exist.
#[must_use]
pub fn path_string(path: &Path) -> Option<String> {
    path.to_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_index_key_is_stable_hex() {
        let a = index_key("/data/a.txt");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(a, index_key("/data/a.txt"));
        assert_ne!(a, index_key("/data/b.txt"));
    }

    #[test]
    fn test_index_key_known_vector() {
        assert_eq!(
            index_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_path_string_round_trips_utf8() {
        assert_eq!(
            path_string(Path::new("/data/clip 01:02.mkv")).as_deref(),
            Some("/data/clip 01:02.mkv")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_path_string_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let path = Path::new(OsStr::from_bytes(b"/data/clip\xff.bin"));
        assert_eq!(path_string(path), None);
    }

    #[test]
    fn test_record_json_omits_missing_hashes() {
        let record = FileRecord {
            path: "/data/a.txt".into(),
            size: 10,
            mod_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            index_key: index_key("/data/a.txt"),
            partial_hash: None,
            full_hash: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("partial_hash"));
        let back: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(!back.is_hashed());
    }
}
