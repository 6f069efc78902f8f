//! Key-value backend abstraction.
//!
//! The index schema in [`super::MetadataStore`] only needs a narrow slice of
//! a Redis-like store: scalar get/set, unordered sets, sorted sets, key
//! deletion and prefix scans. Writes are grouped into a [`WriteBatch`] that a
//! backend applies as one unit. There are no multi-batch transactions.

use thiserror::Error;

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be opened or reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// SQLite reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored record could not be encoded or decoded.
    #[error("corrupt record under {key}: {source}")]
    Corrupt {
        /// Key holding the bad value
        key: String,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// A key holds a value of a different kind than requested.
    #[error("wrong kind of value under {0}")]
    WrongKind(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A member of a sorted set together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    /// Set member
    pub member: String,
    /// Ordering score (lower sorts first)
    pub score: f64,
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Store a scalar value, replacing whatever was under the key.
    Set { key: String, value: Vec<u8> },
    /// Remove a key of any kind.
    Delete { key: String },
    /// Add a member to an unordered set.
    SetAdd { key: String, member: String },
    /// Remove a member from an unordered set.
    SetRemove { key: String, member: String },
    /// Add or re-score a member of a sorted set.
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Remove a member from a sorted set.
    ZRemove { key: String, member: String },
}

/// An ordered list of writes applied together.
///
/// Backends apply a batch in order and as a unit: readers never observe a
/// half-applied batch, and a failed batch leaves no partial writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scalar write.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a key deletion.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Queue a set insertion.
    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Queue a set removal.
    pub fn set_remove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Queue a sorted-set insertion.
    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.ops.push(WriteOp::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    /// Queue a sorted-set removal.
    pub fn zremove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::ZRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Number of queued writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The queued writes, in order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch into its writes.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// The operations the index needs from a key-value service.
///
/// Implementations must be usable from many worker threads at once.
pub trait KvStore: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Check that the backend is reachable.
    fn ping(&self) -> StoreResult<()>;

    /// Read a scalar value.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Whether a key of any kind exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Members of an unordered set, in lexicographic order.
    fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Members of a sorted set ordered by score, then member.
    fn zrange(&self, key: &str) -> StoreResult<Vec<ScoredMember>>;

    /// All keys of any kind starting with `prefix`, in lexicographic order.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Apply a batch of writes as one unit.
    fn apply(&self, batch: WriteBatch) -> StoreResult<()>;
}
