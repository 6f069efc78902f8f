//! Removal of stale index entries.
//!
//! [`Reclaimer::reclaim`] makes two sweeps:
//!
//! 1. every `path_to_key` mapping whose file is gone from disk, or whose
//!    record is missing, is purged
//! 2. every record without a `key_to_path` mapping (a write that never
//!    completed) is purged
//!
//! [`Reclaimer::purge_path`] is also what the duplicate deleter calls after
//! a file has been removed. Purging one path never touches entries of other
//! paths, so it can run alongside indexing of different files.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::IndexContext;
use crate::index::unlink_from_group;
use crate::pool::{PoolConfig, PoolError, WorkerPool};
use crate::store::{index_key, keys, StoreError, WriteBatch};

/// Errors that stop a reclaim run.
#[derive(thiserror::Error, Debug)]
pub enum ReclaimError {
    /// Listing the index failed.
    #[error("Store error during reclaim: {0}")]
    Store(#[from] StoreError),

    /// The pool could not start.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Outcome of a reclaim run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimSummary {
    /// Path mappings examined
    pub checked: usize,
    /// Entries purged because the file is gone
    pub purged_missing: usize,
    /// Entries purged because a mapping or record was missing
    pub purged_incomplete: usize,
    /// Paths whose purge failed
    pub errors: usize,
    /// Whether the run was cancelled before finishing
    pub interrupted: bool,
}

#[derive(Debug, Default)]
struct Counters {
    checked: AtomicUsize,
    purged_missing: AtomicUsize,
    purged_incomplete: AtomicUsize,
    errors: AtomicUsize,
}

/// Removes index entries that no longer describe a file on disk.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    ctx: IndexContext,
    pool: PoolConfig,
}

impl Reclaimer {
    /// Reclaimer over a context.
    #[must_use]
    pub fn new(ctx: IndexContext, pool: PoolConfig) -> Self {
        Self {
            ctx,
            pool: pool.named("reclaim"),
        }
    }

    /// Sweep the whole index.
    ///
    /// # Errors
    ///
    /// [`ReclaimError`] if the index cannot be listed or the pool cannot
    /// start. Failures on individual paths are counted, not returned.
    pub fn reclaim(&self) -> Result<ReclaimSummary, ReclaimError> {
        let counters = Arc::new(Counters::default());

        let paths = self.ctx.store.indexed_paths()?;
        log::info!("Reclaim: checking {} indexed paths", paths.len());
        let pool = WorkerPool::new(&self.pool, self.ctx.cancel.clone())?;
        for path in paths {
            let this = self.clone();
            let counters = Arc::clone(&counters);
            let submitted = pool.submit(move || {
                counters.checked.fetch_add(1, Ordering::Relaxed);
                match this.check_path(&path) {
                    Ok(Verdict::Keep) => {}
                    Ok(Verdict::Missing) => {
                        counters.purged_missing.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Verdict::Incomplete) => {
                        counters.purged_incomplete.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::warn!("Failed to reclaim {path}: {e}");
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
            if submitted.is_err() {
                break;
            }
        }
        let report = pool.join();
        if report.panicked > 0 {
            log::error!("{} reclaim tasks panicked", report.panicked);
            counters.errors.fetch_add(report.panicked, Ordering::Relaxed);
        }

        if !self.ctx.cancel.is_cancelled() {
            self.sweep_orphan_records(&counters)?;
        }

        let summary = ReclaimSummary {
            checked: counters.checked.load(Ordering::Relaxed),
            purged_missing: counters.purged_missing.load(Ordering::Relaxed),
            purged_incomplete: counters.purged_incomplete.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            interrupted: self.ctx.cancel.is_cancelled(),
        };
        log::info!(
            "Reclaim: {} checked, {} missing purged, {} incomplete purged, {} errors",
            summary.checked,
            summary.purged_missing,
            summary.purged_incomplete,
            summary.errors
        );
        Ok(summary)
    }

    fn check_path(&self, path: &str) -> Result<Verdict, StoreError> {
        match std::fs::symlink_metadata(Path::new(path)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Reclaiming missing file: {path}");
                self.purge_path(path)?;
                return Ok(Verdict::Missing);
            }
            Err(e) => {
                log::debug!("Cannot stat {path} ({e}); keeping its entries");
                return Ok(Verdict::Keep);
            }
            Ok(_) => {}
        }

        let has_record = match self.ctx.store.key_for_path(path)? {
            Some(key) => self.ctx.store.has_record(&key)?,
            None => false,
        };
        if has_record {
            Ok(Verdict::Keep)
        } else {
            log::debug!("Reclaiming incomplete entry: {path}");
            self.purge_path(path)?;
            Ok(Verdict::Incomplete)
        }
    }

    fn sweep_orphan_records(&self, counters: &Counters) -> Result<(), StoreError> {
        for key in self.ctx.store.record_keys()? {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            if self.ctx.store.path_for_key(&key)?.is_some() {
                continue;
            }
            let path = match self.ctx.store.get_record(&key) {
                Ok(record) => record.map(|r| r.path),
                Err(StoreError::Corrupt { .. }) => None,
                Err(e) => return Err(e),
            };
            log::debug!("Reclaiming record without path mapping: {key}");
            match self.purge(&key, path.as_deref()) {
                Ok(()) => {
                    counters.purged_incomplete.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!("Failed to reclaim record {key}: {e}");
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Remove every index entry that refers to `path`.
    ///
    /// Deletes the record, both lookups, the stored hashes, and the path's
    /// membership in its candidate set and duplicate group. A group left
    /// with fewer than two members is dropped.
    ///
    /// # Errors
    ///
    /// [`StoreError`] if a lookup or the purge batch fails.
    pub fn purge_path(&self, path: &str) -> Result<(), StoreError> {
        let key = self
            .ctx
            .store
            .key_for_path(path)?
            .unwrap_or_else(|| index_key(path));
        self.purge(&key, Some(path))
    }

    fn purge(&self, key: &str, path: Option<&str>) -> Result<(), StoreError> {
        let store = &self.ctx.store;
        let record = store.get_record(key).ok().flatten();
        let partial = store
            .partial_for_key(key)?
            .or_else(|| record.as_ref().and_then(|r| r.partial_hash.clone()));
        let full = store
            .full_for_key(key)?
            .or_else(|| record.as_ref().and_then(|r| r.full_hash.clone()));

        let mut batch = WriteBatch::new();
        batch
            .delete(keys::record(key))
            .delete(keys::key_to_path(key))
            .delete(keys::key_to_partial(key))
            .delete(keys::key_to_full(key));

        if let Some(path) = path {
            // Only drop the reverse lookup if it still points here.
            if store.key_for_path(path)?.is_none_or(|k| k == key) {
                batch.delete(keys::path_to_key(path));
            }
            if let Some(partial) = &partial {
                batch.set_remove(keys::partial(partial), path);
            }
        }

        match (full, path) {
            (Some(full), Some(path)) => {
                let _guard = self.ctx.group_locks.lock(&full);
                unlink_from_group(&self.ctx, &mut batch, &full, path)?;
                store.apply(batch)
            }
            _ => store.apply(batch),
        }
    }
}

enum Verdict {
    Keep,
    Missing,
    Incomplete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indexer;
    use crate::signal::CancelToken;
    use crate::store::{path_string, KvStore, MemoryStore, MetadataStore, ScoredMember, StoreResult};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    fn reclaimer(ctx: &IndexContext) -> Reclaimer {
        Reclaimer::new(ctx.clone(), PoolConfig::with_workers(2))
    }

    #[test]
    fn test_reclaim_purges_deleted_file_only() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.txt", b"same");
        let b = write(dir.path(), "b.txt", b"same");
        let ctx = IndexContext::in_memory();
        let indexer = Indexer::new(ctx.clone());
        indexer.index_path(&a, true).unwrap();
        indexer.index_path(&b, true).unwrap();

        fs::remove_file(&a).unwrap();
        let summary = reclaimer(&ctx).reclaim().unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.purged_missing, 1);

        let a_str = path_string(&a).unwrap();
        let a_key = index_key(&a_str);
        assert!(ctx.store.key_for_path(&a_str).unwrap().is_none());
        assert!(ctx.store.get_record(&a_key).unwrap().is_none());
        assert!(ctx.store.path_for_key(&a_key).unwrap().is_none());
        assert!(ctx.store.full_for_key(&a_key).unwrap().is_none());

        let partial = ctx.store.partial_hashes().unwrap();
        assert_eq!(
            ctx.store.partial_members(&partial[0]).unwrap(),
            vec![path_string(&b).unwrap()]
        );
        assert!(ctx
            .store
            .has_record(&index_key(&path_string(&b).unwrap()))
            .unwrap());
    }

    #[test]
    fn test_purge_drops_group_below_two() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.txt", b"same");
        let b = write(dir.path(), "b.txt", b"same");
        let ctx = IndexContext::in_memory();
        let indexer = Indexer::new(ctx.clone());
        indexer.index_path(&a, true).unwrap();
        indexer.index_path(&b, true).unwrap();
        let full = ctx
            .store
            .full_for_key(&index_key(&path_string(&a).unwrap()))
            .unwrap()
            .unwrap();
        let mut batch = WriteBatch::new();
        batch
            .zadd(keys::dupes(&full), path_string(&a).unwrap(), -5.0)
            .zadd(keys::dupes(&full), path_string(&b).unwrap(), -5.0);
        ctx.store.apply(batch).unwrap();

        reclaimer(&ctx).purge_path(&path_string(&a).unwrap()).unwrap();
        assert!(ctx.store.group_members(&full).unwrap().is_empty());
    }

    #[test]
    fn test_reclaim_purges_mapping_without_record() {
        let ctx = IndexContext::in_memory();
        let dir = TempDir::new().unwrap();
        let a = path_string(&write(dir.path(), "a.txt", b"x")).unwrap();
        let mut batch = WriteBatch::new();
        batch.set(keys::path_to_key(&a), index_key(&a));
        ctx.store.apply(batch).unwrap();

        let summary = reclaimer(&ctx).reclaim().unwrap();
        assert_eq!(summary.purged_incomplete, 1);
        assert!(ctx.store.indexed_paths().unwrap().is_empty());
    }

    #[test]
    fn test_reclaim_purges_record_without_path_mapping() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.txt", b"x");
        let ctx = IndexContext::in_memory();
        Indexer::new(ctx.clone()).index_path(&a, true).unwrap();
        let key = index_key(&path_string(&a).unwrap());
        let mut batch = WriteBatch::new();
        batch.delete(keys::key_to_path(&key));
        ctx.store.apply(batch).unwrap();

        let summary = reclaimer(&ctx).reclaim().unwrap();
        assert_eq!(summary.purged_incomplete, 1);
        assert!(ctx.store.record_keys().unwrap().is_empty());
        assert!(ctx.store.partial_hashes().unwrap().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_non_utf8_file_is_never_indexed_or_reclaimed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let odd = dir.path().join(OsStr::from_bytes(b"clip\xff.bin"));
        if File::create(&odd).and_then(|mut f| f.write_all(b"frames")).is_err() {
            // filesystem refuses non-UTF-8 names
            return;
        }
        let plain = write(dir.path(), "clip.bin", b"frames");
        let ctx = IndexContext::in_memory();
        let indexer = Indexer::new(ctx.clone());
        assert!(indexer.index_path(&odd, true).is_err());
        indexer.index_path(&plain, true).unwrap();
        assert!(odd.exists());

        let summary = reclaimer(&ctx).reclaim().unwrap();
        assert_eq!(summary.purged_missing, 0);
        assert_eq!(summary.purged_incomplete, 0);
        assert_eq!(ctx.store.record_keys().unwrap().len(), 1);
        assert!(ctx.store.key_for_path(&path_string(&plain).unwrap()).unwrap().is_some());
    }

    /// Delegates to a memory store but panics on lookups of one path.
    struct PanicOnPath {
        inner: MemoryStore,
        trigger: String,
    }

    impl KvStore for PanicOnPath {
        fn name(&self) -> &'static str {
            "panic-on-path"
        }

        fn ping(&self) -> StoreResult<()> {
            self.inner.ping()
        }

        fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            assert!(key != self.trigger, "lookup of {key}");
            self.inner.get(key)
        }

        fn exists(&self, key: &str) -> StoreResult<bool> {
            self.inner.exists(key)
        }

        fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
            self.inner.set_members(key)
        }

        fn zrange(&self, key: &str) -> StoreResult<Vec<ScoredMember>> {
            self.inner.zrange(key)
        }

        fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
            self.inner.scan_prefix(prefix)
        }

        fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
            self.inner.apply(batch)
        }
    }

    #[test]
    fn test_panicking_task_counts_as_error() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.txt", b"one");
        let b = write(dir.path(), "b.txt", b"two");
        let backend = PanicOnPath {
            inner: MemoryStore::new(),
            trigger: keys::path_to_key(&path_string(&b).unwrap()),
        };
        let ctx = IndexContext::new(MetadataStore::new(Arc::new(backend)), CancelToken::new());

        // Index through a plain batch so the trigger key is written, not read.
        for path in [&a, &b] {
            let path = path_string(path).unwrap();
            let key = index_key(&path);
            let mut batch = WriteBatch::new();
            batch
                .set(keys::path_to_key(&path), key.clone())
                .set(keys::key_to_path(&key), path.clone());
            ctx.store.apply(batch).unwrap();
        }

        let summary = reclaimer(&ctx).reclaim().unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.checked, 2);
    }
}
