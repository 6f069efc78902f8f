//! Duplicate group resolution.
//!
//! [`DuplicateResolver::find_duplicates`] turns candidate sets (paths that
//! share a partial hash) into `dupes:` groups keyed by full hash.
//! [`DuplicateResolver::list_groups`] reads them back canonical-first, and
//! [`DuplicateResolver::delete_duplicates`] removes every member but the
//! first from disk and from the index.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::actions::{delete_file, validate_preserves_copy, DeleteMode, Expected};
use crate::context::IndexContext;
use crate::index::Indexer;
use crate::pool::{PoolConfig, PoolError, WorkerPool};
use crate::reclaim::Reclaimer;
use crate::store::{index_key, keys, ScoredMember, StoreError, WriteBatch};

use super::scoring::selection_score;

/// Default ceiling on groups created or processed per run.
pub const DEFAULT_MAX_GROUPS: usize = 50;

/// Errors that stop a resolver run.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// The index could not be read or written.
    #[error("Store error while resolving duplicates: {0}")]
    Store(#[from] StoreError),

    /// The pool could not start.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Only paths under this directory take part
    pub root: PathBuf,
    /// Pool used by `find_duplicates`
    pub pool: PoolConfig,
    /// Groups per run; 0 means no limit
    pub max_groups: usize,
}

impl ResolverConfig {
    /// Defaults for `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            pool: PoolConfig::default(),
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }

    /// Set the pool.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the group ceiling (0 for none).
    #[must_use]
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }
}

/// Files with identical content, canonical member first.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Shared full hash
    pub full_hash: String,
    /// Members ordered by score, then path
    pub members: Vec<ScoredMember>,
}

impl DuplicateGroup {
    /// Path of the copy to keep.
    #[must_use]
    pub fn canonical(&self) -> Option<&str> {
        self.members.first().map(|m| m.member.as_str())
    }

    /// Members other than the canonical one.
    #[must_use]
    pub fn removable(&self) -> &[ScoredMember] {
        self.members.get(1..).unwrap_or_default()
    }

    /// Member paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.member.as_str())
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Outcome of `find_duplicates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindSummary {
    /// Candidate sets with more than one member
    pub candidate_sets: usize,
    /// Candidate paths examined
    pub files_checked: usize,
    /// Full hashes computed because none was stored
    pub hashed: usize,
    /// Paths skipped because they are gone from disk
    pub skipped_missing: usize,
    /// Paths skipped because they lie outside the root
    pub skipped_outside_root: usize,
    /// Groups written
    pub groups: usize,
    /// Paths whose full hash could not be obtained
    pub errors: usize,
    /// Whether `max_groups` cut the run short
    pub limit_reached: bool,
    /// Whether the run was cancelled
    pub interrupted: bool,
}

/// Outcome of `delete_duplicates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Groups whose removable members were attempted
    pub groups_processed: usize,
    /// Groups skipped because the canonical file is missing
    pub groups_skipped: usize,
    /// Files removed from disk
    pub files_deleted: usize,
    /// Bytes removed
    pub bytes_freed: u64,
    /// Files that could not be removed or purged
    pub errors: usize,
    /// Whether `max_groups` cut the run short
    pub limit_reached: bool,
    /// Whether the run was cancelled
    pub interrupted: bool,
}

#[derive(Debug, Default)]
struct FindCounters {
    candidate_sets: AtomicUsize,
    files_checked: AtomicUsize,
    hashed: AtomicUsize,
    skipped_missing: AtomicUsize,
    skipped_outside_root: AtomicUsize,
    groups: AtomicUsize,
    errors: AtomicUsize,
    limit_reached: AtomicBool,
}

impl FindCounters {
    /// Claim one group slot under `max_groups`.
    fn reserve_group(&self, max_groups: usize) -> bool {
        let reserved = self
            .groups
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max_groups == 0 || n < max_groups).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            self.limit_reached.store(true, Ordering::Release);
        }
        reserved
    }
}

/// Builds, lists and deletes duplicate groups.
#[derive(Debug, Clone)]
pub struct DuplicateResolver {
    ctx: IndexContext,
    config: ResolverConfig,
    indexer: Indexer,
    reclaimer: Reclaimer,
}

impl DuplicateResolver {
    /// Resolver over a context.
    #[must_use]
    pub fn new(ctx: IndexContext, config: ResolverConfig) -> Self {
        Self {
            indexer: Indexer::new(ctx.clone()),
            reclaimer: Reclaimer::new(ctx.clone(), config.pool.clone()),
            ctx,
            config,
        }
    }

    /// Settings in use.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Group every candidate set by full hash and record groups of two or
    /// more.
    ///
    /// Missing full hashes are computed and stored on the way. Stops
    /// creating groups once `max_groups` is reached.
    ///
    /// # Errors
    ///
    /// [`ResolveError`] if candidate sets cannot be listed or the pool
    /// cannot start. Per-path failures are counted.
    pub fn find_duplicates(&self) -> Result<FindSummary, ResolveError> {
        let counters = Arc::new(FindCounters::default());
        let partials = self.ctx.store.partial_hashes()?;
        log::info!("Resolving {} candidate sets", partials.len());

        let pool_config = self.config.pool.clone().named("resolve");
        let pool = WorkerPool::new(&pool_config, self.ctx.cancel.clone())?;
        for partial in partials {
            if counters.limit_reached.load(Ordering::Acquire) {
                break;
            }
            let this = self.clone();
            let counters = Arc::clone(&counters);
            let submitted = pool.submit(move || {
                if let Err(e) = this.resolve_candidate_set(&partial, &counters) {
                    log::warn!("Failed to resolve candidate set {partial}: {e}");
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                }
            });
            if submitted.is_err() {
                break;
            }
        }
        let report = pool.join();
        log::debug!("Resolver pool: {report:?}");

        let summary = FindSummary {
            candidate_sets: counters.candidate_sets.load(Ordering::Relaxed),
            files_checked: counters.files_checked.load(Ordering::Relaxed),
            hashed: counters.hashed.load(Ordering::Relaxed),
            skipped_missing: counters.skipped_missing.load(Ordering::Relaxed),
            skipped_outside_root: counters.skipped_outside_root.load(Ordering::Relaxed),
            groups: counters.groups.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            limit_reached: counters.limit_reached.load(Ordering::Relaxed),
            interrupted: self.ctx.cancel.is_cancelled(),
        };
        if summary.limit_reached {
            log::info!("Reached the limit of {} duplicate groups", self.config.max_groups);
        }
        log::info!(
            "Found {} duplicate groups from {} candidate sets",
            summary.groups,
            summary.candidate_sets
        );
        Ok(summary)
    }

    fn resolve_candidate_set(&self, partial: &str, counters: &FindCounters) -> Result<(), StoreError> {
        if counters.limit_reached.load(Ordering::Acquire) {
            return Ok(());
        }
        let members = self.ctx.store.partial_members(partial)?;
        if members.len() < 2 {
            return Ok(());
        }
        counters.candidate_sets.fetch_add(1, Ordering::Relaxed);

        let mut by_full: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for member in members {
            counters.files_checked.fetch_add(1, Ordering::Relaxed);
            let path = Path::new(&member);
            if !path.starts_with(&self.config.root) {
                log::trace!("Outside root, skipping: {member}");
                counters.skipped_outside_root.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if !on_disk(path) {
                log::debug!("Candidate no longer on disk: {member}");
                counters.skipped_missing.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let full = match self.ctx.store.full_for_key(&index_key(&member))? {
                Some(full) => full,
                None => match self.indexer.ensure_full_hash(path) {
                    Ok(full) => {
                        counters.hashed.fetch_add(1, Ordering::Relaxed);
                        full
                    }
                    Err(e) => {
                        log::warn!("Cannot hash {member}: {e}");
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                },
            };
            by_full.entry(full).or_default().push(member);
        }

        for (full, paths) in by_full {
            if paths.len() < 2 {
                continue;
            }
            if !counters.reserve_group(self.config.max_groups) {
                return Ok(());
            }
            let mut batch = WriteBatch::new();
            for path in &paths {
                batch.zadd(keys::dupes(&full), path.as_str(), selection_score(path));
            }
            let _guard = self.ctx.group_locks.lock(&full);
            self.ctx.store.apply(batch)?;
            log::debug!("Duplicate group {full}: {} members", paths.len());
        }
        Ok(())
    }

    /// Stored duplicate groups with at least two members, ordered by full
    /// hash.
    ///
    /// # Errors
    ///
    /// [`StoreError`] if the group keys cannot be listed; errors loading an
    /// individual group are yielded by the iterator.
    pub fn list_groups(
        &self,
    ) -> Result<impl Iterator<Item = Result<DuplicateGroup, StoreError>> + '_, StoreError> {
        let hashes = self.ctx.store.group_hashes()?;
        Ok(hashes.into_iter().filter_map(move |full_hash| {
            match self.ctx.store.group_members(&full_hash) {
                Ok(members) if members.len() >= 2 => Some(Ok(DuplicateGroup { full_hash, members })),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// All stored groups, collected.
    ///
    /// # Errors
    ///
    /// The first [`StoreError`] hit while loading.
    pub fn groups(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        self.list_groups()?.collect()
    }

    /// Delete every member but the canonical one of each group.
    ///
    /// A group whose canonical file is missing from disk is skipped
    /// entirely. A member is purged from the index only after it was removed
    /// from disk. At most `max_groups` groups are processed.
    pub fn delete_duplicates(&self, groups: &[DuplicateGroup], mode: DeleteMode) -> DeleteSummary {
        let mut summary = DeleteSummary::default();

        for group in groups {
            if self.ctx.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            let handled = summary.groups_processed + summary.groups_skipped;
            if self.config.max_groups != 0 && handled >= self.config.max_groups {
                summary.limit_reached = true;
                log::info!("Reached the limit of {} groups", self.config.max_groups);
                break;
            }

            let Some(keep) = group.canonical() else {
                continue;
            };
            if !on_disk(Path::new(keep)) {
                log::warn!(
                    "Skipping group {}: canonical file {} is missing",
                    group.full_hash,
                    keep
                );
                summary.groups_skipped += 1;
                continue;
            }

            let selected: Vec<&str> = group.removable().iter().map(|m| m.member.as_str()).collect();
            let all: Vec<&str> = group.paths().collect();
            if let Err(e) = validate_preserves_copy(&selected, &all) {
                log::error!("Skipping group {}: {e}", group.full_hash);
                summary.groups_skipped += 1;
                continue;
            }

            summary.groups_processed += 1;
            log::info!("Keeping {keep}");
            for path in selected {
                self.delete_member(path, mode, &mut summary);
            }
        }

        log::info!(
            "Deleted {} files ({} bytes) from {} groups, {} errors",
            summary.files_deleted,
            summary.bytes_freed,
            summary.groups_processed,
            summary.errors
        );
        summary
    }

    fn delete_member(&self, path: &str, mode: DeleteMode, summary: &mut DeleteSummary) {
        let expected = match self.expected_state(path) {
            Ok(expected) => expected,
            Err(e) => {
                log::warn!("Cannot read index entry for {path}: {e}");
                summary.errors += 1;
                return;
            }
        };

        match delete_file(Path::new(path), mode, expected) {
            Ok(result) => {
                summary.files_deleted += 1;
                summary.bytes_freed += result.size;
                if let Err(e) = self.reclaimer.purge_path(path) {
                    log::warn!("Deleted {path} but failed to purge its index entries: {e}");
                    summary.errors += 1;
                }
            }
            Err(e) => {
                log::warn!("Failed to delete {path}: {e}");
                summary.errors += 1;
            }
        }
    }

    fn expected_state(&self, path: &str) -> Result<Option<Expected>, StoreError> {
        let key = self
            .ctx
            .store
            .key_for_path(path)?
            .unwrap_or_else(|| index_key(path));
        Ok(self.ctx.store.get_record(&key)?.map(|record| Expected {
            size: record.size,
            modified: Some(SystemTime::from(record.mod_time)),
        }))
    }
}

/// Whether `path` exists, treating errors other than not-found as present.
fn on_disk(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}
