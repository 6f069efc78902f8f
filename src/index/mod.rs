//! Per-file indexing.
//!
//! [`Indexer::index_file`] turns one file into a [`FileRecord`] and its
//! mappings, written as a single [`WriteBatch`]:
//!
//! | key                     | written           |
//! |-------------------------|-------------------|
//! | `record:{key}`          | always            |
//! | `path_to_key:{path}`    | always            |
//! | `key_to_path:{key}`     | always            |
//! | `partial:{hash}` (set)  | with hashing      |
//! | `key_to_partial:{key}`  | with hashing      |
//! | `key_to_full:{key}`     | with hashing      |
//!
//! Re-indexing an already known file without hashing is a no-op. With
//! hashing the record is always rewritten, and memberships left over from
//! the previous hashes are removed in the same batch.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::context::IndexContext;
use crate::scanner::HashError;
use crate::store::{self, index_key, keys, path_string, FileRecord, StoreError, WriteBatch};

/// Why a file could not be indexed.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The file vanished before it could be examined.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// `stat` failed for another reason.
    #[error("Cannot stat {path}: {source}")]
    Stat {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The path is not a regular file.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// The path is not valid UTF-8 and cannot be stored.
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// Hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// The store rejected the file's batch.
    #[error("Store error for {path}: {source}")]
    Store {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: StoreError,
    },
}

impl IndexError {
    /// Whether this is a missing-file error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Hash(HashError::NotFound(_))
        )
    }
}

/// Result of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A record already existed and hashing was not requested.
    AlreadyIndexed,
    /// The record was written.
    Indexed {
        /// Whether hashes were computed
        hashed: bool,
    },
}

/// Writes file records into the index.
#[derive(Debug, Clone)]
pub struct Indexer {
    ctx: IndexContext,
}

impl Indexer {
    /// Indexer over a shared context.
    #[must_use]
    pub fn new(ctx: IndexContext) -> Self {
        Self { ctx }
    }

    /// The context this indexer writes through.
    #[must_use]
    pub fn context(&self) -> &IndexContext {
        &self.ctx
    }

    /// Index `root/relative`.
    ///
    /// # Errors
    ///
    /// Any [`IndexError`]; nothing is written for this file in that case.
    pub fn index_file(
        &self,
        root: &Path,
        relative: &Path,
        compute_hashes: bool,
    ) -> Result<IndexOutcome, IndexError> {
        self.index_path(&root.join(relative), compute_hashes)
    }

    /// Index an absolute path.
    ///
    /// # Errors
    ///
    /// See [`Indexer::index_file`].
    pub fn index_path(&self, path: &Path, compute_hashes: bool) -> Result<IndexOutcome, IndexError> {
        let path_str =
            path_string(path).ok_or_else(|| IndexError::NonUtf8Path(path.to_path_buf()))?;
        let key = index_key(&path_str);
        let store = &self.ctx.store;
        let store_err = |source| IndexError::Store {
            path: path.to_path_buf(),
            source,
        };

        if !compute_hashes && store.has_record(&key).map_err(store_err)? {
            log::trace!("Already indexed: {}", path.display());
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let metadata = fs::metadata(path).map_err(|e| stat_error(path, e))?;
        if !metadata.is_file() {
            return Err(IndexError::NotAFile(path.to_path_buf()));
        }

        let hashes = if compute_hashes {
            let _permit = self.ctx.fd_budget.acquire();
            let partial = self.ctx.hasher.partial_hash(path)?;
            let full = self.ctx.hasher.full_hash(path)?;
            Some((partial, full))
        } else {
            None
        };

        let record = FileRecord {
            path: path_str.clone(),
            size: metadata.len(),
            mod_time: mod_time(&metadata),
            index_key: key.clone(),
            partial_hash: hashes.as_ref().map(|(p, _)| p.clone()),
            full_hash: hashes.as_ref().map(|(_, f)| f.clone()),
        };

        let mut batch = WriteBatch::new();
        store::put_record(&mut batch, &record).map_err(store_err)?;
        batch
            .set(keys::path_to_key(&path_str), key.clone())
            .set(keys::key_to_path(&key), path_str.clone());

        let Some((partial, full)) = hashes else {
            store.apply(batch).map_err(store_err)?;
            log::trace!("Indexed {} ({} bytes)", path.display(), record.size);
            return Ok(IndexOutcome::Indexed { hashed: false });
        };

        let old_partial = store.partial_for_key(&key).map_err(store_err)?;
        if let Some(old) = old_partial.as_deref().filter(|old| *old != partial) {
            batch.set_remove(keys::partial(old), path_str.clone());
        }
        batch
            .set_add(keys::partial(&partial), path_str.clone())
            .set(keys::key_to_partial(&key), partial)
            .set(keys::key_to_full(&key), full.clone());

        let old_full = store.full_for_key(&key).map_err(store_err)?;
        match old_full.filter(|old| *old != full) {
            Some(old) => {
                // Leaving the old group may shrink it below two members.
                let _guard = self.ctx.group_locks.lock(&old);
                unlink_from_group(&self.ctx, &mut batch, &old, &path_str).map_err(store_err)?;
                store.apply(batch).map_err(store_err)?;
            }
            None => store.apply(batch).map_err(store_err)?,
        }

        log::trace!("Indexed and hashed {} ({} bytes)", path.display(), record.size);
        Ok(IndexOutcome::Indexed { hashed: true })
    }

    /// Full hash for an indexed path, computing and storing it if absent.
    ///
    /// # Errors
    ///
    /// [`IndexError`] if hashing fails or the store rejects the update.
    pub fn ensure_full_hash(&self, path: &Path) -> Result<String, IndexError> {
        let path_str =
            path_string(path).ok_or_else(|| IndexError::NonUtf8Path(path.to_path_buf()))?;
        let key = index_key(&path_str);
        let store = &self.ctx.store;
        let store_err = |source| IndexError::Store {
            path: path.to_path_buf(),
            source,
        };

        if let Some(full) = store.full_for_key(&key).map_err(store_err)? {
            return Ok(full);
        }

        let full = {
            let _permit = self.ctx.fd_budget.acquire();
            self.ctx.hasher.full_hash(path)?
        };

        let mut batch = WriteBatch::new();
        if let Some(mut record) = store.get_record(&key).map_err(store_err)? {
            record.full_hash = Some(full.clone());
            store::put_record(&mut batch, &record).map_err(store_err)?;
        }
        batch.set(keys::key_to_full(&key), full.clone());
        store.apply(batch).map_err(store_err)?;
        log::debug!("Computed missing full hash for {}", path.display());
        Ok(full)
    }
}

/// Queue removal of `path` from `dupes:{full_hash}`, dropping the group when
/// fewer than two members would remain. Caller holds the group lock.
pub(crate) fn unlink_from_group(
    ctx: &IndexContext,
    batch: &mut WriteBatch,
    full_hash: &str,
    path: &str,
) -> Result<(), StoreError> {
    let members = ctx.store.group_members(full_hash)?;
    if !members.iter().any(|m| m.member == path) {
        return Ok(());
    }
    if members.len() <= 2 {
        batch.delete(keys::dupes(full_hash));
    } else {
        batch.zremove(keys::dupes(full_hash), path);
    }
    Ok(())
}

fn stat_error(path: &Path, error: io::Error) -> IndexError {
    if error.kind() == io::ErrorKind::NotFound {
        IndexError::NotFound(path.to_path_buf())
    } else {
        IndexError::Stat {
            path: path.to_path_buf(),
            source: error,
        }
    }
}

fn mod_time(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .into()
}
