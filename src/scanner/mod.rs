//! Scanning: directory traversal, filtering and dispatch.
//!
//! This module provides:
//! - [`Walker`]: jwalk-based traversal with exclude pruning and a size floor
//! - [`ExcludeMatcher`]: glob-like exclude patterns
//! - [`Hasher`]: BLAKE3 partial and full content hashes
//! - [`Scanner`]: feeds walker output to a [`WorkerPool`] of indexing tasks
//!
//! # Example
//!
//! ```no_run
//! use dupindex::context::IndexContext;
//! use dupindex::scanner::{ScanConfig, Scanner};
//! use std::path::PathBuf;
//!
//! let ctx = IndexContext::in_memory();
//! let config = ScanConfig::new(PathBuf::from("/srv/media")).with_min_size(1024 * 1024);
//! let summary = Scanner::new(ctx, config).run()?;
//! println!("indexed {} files", summary.counts.indexed);
//! # Ok::<(), dupindex::scanner::ScanError>(())
//! ```

pub mod exclude;
pub mod hasher;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::context::IndexContext;
use crate::index::{IndexOutcome, Indexer};
use crate::pool::{PoolConfig, PoolError, PoolReport, WorkerPool};

pub use exclude::{ExcludeError, ExcludeMatcher};
pub use hasher::{HashLimit, Hasher, PARTIAL_HASH_SIZE};
pub use walker::{Walker, WalkerConfig};

/// A regular file found by the walker.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the scan root
    pub relative: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The indexing pool could not start.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                Self::PermissionDenied(path.to_path_buf())
            }
            io::ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                Self::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                Self::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Progress counters owned by a scan.
///
/// Written by the walker and the indexing tasks; read through
/// [`ScanCounters::snapshot`] by whoever reports progress.
#[derive(Debug, Default)]
pub struct ScanCounters {
    pub(crate) submitted: AtomicUsize,
    pub(crate) excluded: AtomicUsize,
    pub(crate) dirs_pruned: AtomicUsize,
    pub(crate) too_small: AtomicUsize,
    pub(crate) non_utf8: AtomicUsize,
    pub(crate) indexed: AtomicUsize,
    pub(crate) hashed: AtomicUsize,
    pub(crate) already_indexed: AtomicUsize,
    pub(crate) errors: AtomicUsize,
}

impl ScanCounters {
    /// Consistent-enough copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            dirs_pruned: self.dirs_pruned.load(Ordering::Relaxed),
            too_small: self.too_small.load(Ordering::Relaxed),
            non_utf8: self.non_utf8.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            hashed: self.hashed.load(Ordering::Relaxed),
            already_indexed: self.already_indexed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of [`ScanCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    /// Files handed to the pool
    pub submitted: usize,
    /// Files skipped by exclude patterns
    pub excluded: usize,
    /// Directories pruned by exclude patterns
    pub dirs_pruned: usize,
    /// Files below the minimum size
    pub too_small: usize,
    /// Files skipped because their path is not valid UTF-8
    pub non_utf8: usize,
    /// Records written
    pub indexed: usize,
    /// Records written with hashes
    pub hashed: usize,
    /// Files skipped because a record existed
    pub already_indexed: usize,
    /// Files that failed (walk, stat, hash or store)
    pub errors: usize,
}

impl ScanSnapshot {
    /// Files whose indexing task has finished, successfully or not.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.indexed + self.already_indexed + self.errors
    }
}

/// Scan parameters.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory to scan
    pub root: PathBuf,
    /// Files below this size are not indexed
    pub min_size: u64,
    /// Compute partial and full hashes
    pub compute_hashes: bool,
    /// Exclude patterns
    pub exclude: Arc<ExcludeMatcher>,
    /// Indexing pool sizing
    pub pool: PoolConfig,
}

impl ScanConfig {
    /// Scan of `root` with hashing on, no size floor and no excludes.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            min_size: 0,
            compute_hashes: true,
            exclude: Arc::new(ExcludeMatcher::empty()),
            pool: PoolConfig::default().named("index"),
        }
    }

    /// Set the size floor.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Enable or disable hashing.
    #[must_use]
    pub fn with_hashes(mut self, compute_hashes: bool) -> Self {
        self.compute_hashes = compute_hashes;
        self
    }

    /// Set exclude patterns.
    #[must_use]
    pub fn with_exclude(mut self, exclude: ExcludeMatcher) -> Self {
        self.exclude = Arc::new(exclude);
        self
    }

    /// Set pool sizing.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// Result of a finished scan.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    /// Canonical root that was scanned
    pub root: PathBuf,
    /// Final counter values
    pub counts: ScanSnapshot,
    /// Pool task accounting
    pub pool: PoolReport,
    /// Whether the scan was cut short by cancellation
    pub interrupted: bool,
    /// Wall time
    pub elapsed: Duration,
}

/// Walks a tree and indexes every eligible file on a worker pool.
#[derive(Debug)]
pub struct Scanner {
    ctx: IndexContext,
    config: ScanConfig,
    counters: Arc<ScanCounters>,
}

impl Scanner {
    /// Scanner over a context.
    #[must_use]
    pub fn new(ctx: IndexContext, config: ScanConfig) -> Self {
        Self {
            ctx,
            config,
            counters: Arc::new(ScanCounters::default()),
        }
    }

    /// Shared counters, for a progress reporter.
    #[must_use]
    pub fn counters(&self) -> Arc<ScanCounters> {
        Arc::clone(&self.counters)
    }

    /// Run the scan to completion or cancellation.
    ///
    /// # Errors
    ///
    /// Fatal problems only: the root is missing or not a directory, or the
    /// pool cannot start. Per-file failures are logged and counted.
    pub fn run(&self) -> Result<ScanSummary, ScanError> {
        let start = Instant::now();
        let root = validate_root(&self.config.root)?;
        log::info!(
            "Scanning {} (min size {} bytes, hashing {})",
            root.display(),
            self.config.min_size,
            if self.config.compute_hashes { "on" } else { "off" }
        );

        let pool = WorkerPool::new(&self.config.pool, self.ctx.cancel.clone())?;
        let indexer = Indexer::new(self.ctx.clone());
        let walker = Walker::new(
            &root,
            WalkerConfig {
                min_size: self.config.min_size,
                exclude: Arc::clone(&self.config.exclude),
            },
        )
        .with_cancel(self.ctx.cancel.clone())
        .with_counters(Arc::clone(&self.counters));

        let root = Arc::new(root);
        for entry in walker.walk() {
            let file = match entry {
                Ok(file) => file,
                Err(_) => {
                    // already logged by the walker
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let indexer = indexer.clone();
            let counters = Arc::clone(&self.counters);
            let root = Arc::clone(&root);
            let compute_hashes = self.config.compute_hashes;
            let submitted = pool.submit(move || {
                match indexer.index_file(&root, &file.relative, compute_hashes) {
                    Ok(IndexOutcome::AlreadyIndexed) => {
                        counters.already_indexed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(IndexOutcome::Indexed { hashed }) => {
                        counters.indexed.fetch_add(1, Ordering::Relaxed);
                        if hashed {
                            counters.hashed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        if e.is_not_found() {
                            log::debug!("Skipping vanished file: {e}");
                        } else {
                            log::warn!("Failed to index {}: {e}", file.path.display());
                        }
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
            match submitted {
                Ok(()) => {
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(PoolError::Stopped) => break,
                Err(e) => return Err(e.into()),
            }
        }

        let report = pool.join();
        let interrupted = self.ctx.cancel.is_cancelled();
        if report.panicked > 0 {
            log::error!("{} indexing tasks panicked", report.panicked);
            self.counters
                .errors
                .fetch_add(report.panicked, Ordering::Relaxed);
        }
        let counts = self.counters.snapshot();
        log::info!(
            "Scan {}: {} indexed ({} hashed), {} unchanged, {} excluded, {} too small, {} non-UTF-8, {} errors",
            if interrupted { "interrupted" } else { "complete" },
            counts.indexed,
            counts.hashed,
            counts.already_indexed,
            counts.excluded,
            counts.too_small,
            counts.non_utf8,
            counts.errors
        );

        Ok(ScanSummary {
            root: root.as_ref().clone(),
            counts,
            pool: report,
            interrupted,
            elapsed: start.elapsed(),
        })
    }
}

/// Canonicalize the scan root, failing if it is missing or not a directory.
///
/// # Errors
///
/// [`ScanError::NotFound`], [`ScanError::NotADirectory`] or another I/O
/// classification.
pub fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = std::fs::canonicalize(root).map_err(|e| ScanError::from_io(root, e))?;
    if !canonical.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    Ok(canonical)
}
