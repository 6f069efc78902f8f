//! Metadata store for the file index.
//!
//! [`MetadataStore`] layers the index schema (see [`keys`]) over any
//! [`KvStore`] backend:
//!
//! * `record:{key}` holds the [`FileRecord`] as JSON
//! * `path_to_key:` / `key_to_path:` are the bidirectional lookup
//! * `partial:{hash}` sets collect duplicate candidates
//! * `key_to_partial:` / `key_to_full:` remember each file's hashes
//! * `dupes:{hash}` sorted sets are the duplicate groups
//!
//! Reads go straight to the backend. Writes are assembled by callers into a
//! [`WriteBatch`] so that one file's update lands as a unit.

pub mod backend;
pub mod keys;
pub mod memory;
pub mod record;
pub mod sqlite;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use backend::{KvStore, ScoredMember, StoreError, StoreResult, WriteBatch, WriteOp};
pub use memory::MemoryStore;
pub use record::{index_key, path_string, FileRecord};
pub use sqlite::SqliteStore;

/// Which backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Persistent SQLite file
    #[default]
    Sqlite,
    /// In-process, discarded on exit
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}' (expected sqlite or memory)")),
        }
    }
}

/// Handle to the index. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn KvStore>,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl MetadataStore {
    /// Wrap an existing backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self { backend }
    }

    /// A fresh in-memory index.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Open a backend and check that it answers.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] when the backend cannot be opened or
    /// does not respond to a ping.
    pub fn open(kind: StoreKind, db_path: &Path) -> StoreResult<Self> {
        let backend: Arc<dyn KvStore> = match kind {
            StoreKind::Sqlite => Arc::new(SqliteStore::open(db_path)?),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        backend
            .ping()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        log::debug!("Using {} metadata store", backend.name());
        Ok(Self::new(backend))
    }

    /// Backend name for log lines.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check that the backend answers.
    pub fn ping(&self) -> StoreResult<()> {
        self.backend.ping()
    }

    /// Apply a batch of writes as one unit.
    pub fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        self.backend.apply(batch)
    }

    fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .backend
            .get(key)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn scan_ids(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .backend
            .scan_prefix(prefix)?
            .into_iter()
            .filter_map(|key| keys::strip(&key, prefix).map(str::to_string))
            .collect())
    }

    /// Load the record for an index key.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] when the stored JSON does not decode.
    pub fn get_record(&self, index_key: &str) -> StoreResult<Option<FileRecord>> {
        let key = keys::record(index_key);
        match self.backend.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    /// Whether a record exists for an index key.
    pub fn has_record(&self, index_key: &str) -> StoreResult<bool> {
        self.backend.exists(&keys::record(index_key))
    }

    /// Index key recorded for a path.
    pub fn key_for_path(&self, path: &str) -> StoreResult<Option<String>> {
        self.get_string(&keys::path_to_key(path))
    }

    /// Path recorded for an index key.
    pub fn path_for_key(&self, index_key: &str) -> StoreResult<Option<String>> {
        self.get_string(&keys::key_to_path(index_key))
    }

    /// Partial hash recorded for an index key.
    pub fn partial_for_key(&self, index_key: &str) -> StoreResult<Option<String>> {
        self.get_string(&keys::key_to_partial(index_key))
    }

    /// Full hash recorded for an index key.
    pub fn full_for_key(&self, index_key: &str) -> StoreResult<Option<String>> {
        self.get_string(&keys::key_to_full(index_key))
    }

    /// Paths sharing a partial hash, in lexicographic order.
    pub fn partial_members(&self, partial_hash: &str) -> StoreResult<Vec<String>> {
        self.backend.set_members(&keys::partial(partial_hash))
    }

    /// Members of a duplicate group, canonical first.
    pub fn group_members(&self, full_hash: &str) -> StoreResult<Vec<ScoredMember>> {
        self.backend.zrange(&keys::dupes(full_hash))
    }

    /// Every partial hash that has a candidate set.
    pub fn partial_hashes(&self) -> StoreResult<Vec<String>> {
        self.scan_ids(keys::PARTIAL)
    }

    /// Every full hash that has a duplicate group.
    pub fn group_hashes(&self) -> StoreResult<Vec<String>> {
        self.scan_ids(keys::DUPES)
    }

    /// Every path with a `path_to_key` mapping.
    pub fn indexed_paths(&self) -> StoreResult<Vec<String>> {
        self.scan_ids(keys::PATH_TO_KEY)
    }

    /// Every index key with a record.
    pub fn record_keys(&self) -> StoreResult<Vec<String>> {
        self.scan_ids(keys::RECORD)
    }

    /// Load every record, skipping ones that fail to decode.
    pub fn records(&self) -> StoreResult<Vec<FileRecord>> {
        let mut records = Vec::new();
        for index_key in self.record_keys()? {
            match self.get_record(&index_key) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, source }) => {
                    log::warn!("Skipping corrupt record {key}: {source}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

/// Queue a record write onto `batch`.
///
/// # Errors
///
/// [`StoreError::Corrupt`] if the record cannot be serialized.
pub fn put_record(batch: &mut WriteBatch, record: &FileRecord) -> StoreResult<()> {
    let key = keys::record(&record.index_key);
    let json = serde_json::to_vec(record).map_err(|source| StoreError::Corrupt {
        key: key.clone(),
        source,
    })?;
    batch.set(key, json);
    Ok(())
}
