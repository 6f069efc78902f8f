//! Shared run context.
//!
//! Everything a task needs that outlives a single file: the store handle,
//! the hasher, the open-file budget, the cancellation token and the lock
//! table for duplicate groups. Built once per run and cloned into tasks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::pool::FdBudget;
use crate::scanner::Hasher;
use crate::signal::CancelToken;
use crate::store::MetadataStore;

/// Default number of stripes in [`GroupLocks`].
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// Default cap on simultaneously open files.
pub const DEFAULT_MAX_OPEN_FILES: usize = 100;

/// Striped locks keyed by full hash.
///
/// Writers to the same `dupes:` group serialize on one stripe; unrelated
/// groups usually land on different stripes and proceed in parallel.
#[derive(Debug)]
pub struct GroupLocks {
    stripes: Vec<Mutex<()>>,
}

impl GroupLocks {
    /// Table with `stripes` locks (at least one).
    #[must_use]
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the stripe owning `full_hash`.
    pub fn lock(&self, full_hash: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(full_hash)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stripe_of(&self, full_hash: &str) -> usize {
        let mut h = DefaultHasher::new();
        full_hash.hash(&mut h);
        (h.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for GroupLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_STRIPES)
    }
}

/// Handles shared by every component of a run.
#[derive(Debug, Clone)]
pub struct IndexContext {
    /// Index handle
    pub store: MetadataStore,
    /// Content hasher
    pub hasher: Hasher,
    /// Open-file budget
    pub fd_budget: FdBudget,
    /// Run-wide cancellation
    pub cancel: CancelToken,
    /// Per-group write locks
    pub group_locks: Arc<GroupLocks>,
}

impl IndexContext {
    /// Context with default hasher, budget and lock table.
    #[must_use]
    pub fn new(store: MetadataStore, cancel: CancelToken) -> Self {
        Self {
            store,
            hasher: Hasher::new(),
            fd_budget: FdBudget::new(DEFAULT_MAX_OPEN_FILES),
            cancel,
            group_locks: Arc::new(GroupLocks::default()),
        }
    }

    /// Replace the hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the open-file budget.
    #[must_use]
    pub fn with_max_open_files(mut self, max_open_files: usize) -> Self {
        self.fd_budget = FdBudget::new(max_open_files);
        self
    }

    /// In-memory store and a fresh token. For tests and throwaway runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MetadataStore::in_memory(), CancelToken::new())
    }
}
