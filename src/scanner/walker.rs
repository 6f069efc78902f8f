//! Directory walker built on jwalk.
//!
//! # Overview
//!
//! [`Walker`] streams the regular files under a root, one [`FileEntry`] at a
//! time, for the scanner to dispatch. Directory reads happen on jwalk's
//! rayon threads; the iterator itself is consumed by a single producer.
//!
//! # Filtering
//!
//! - Directories matching the [`ExcludeMatcher`] are removed from their
//!   parent's listing, so they are never read.
//! - Excluded files and files below `min_size` are dropped.
//! - Files whose path is not valid UTF-8 are dropped and counted; the index
//!   stores paths as strings and cannot represent them.
//! - Symbolic links are never followed and never yielded.
//! - Hidden entries are walked like any other.
//!
//! # Example
//!
//! ```no_run
//! use dupindex::scanner::{ExcludeMatcher, Walker, WalkerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = WalkerConfig {
//!     min_size: 1024,
//!     exclude: Arc::new(ExcludeMatcher::from_patterns(["*/.git/*"]).unwrap()),
//! };
//! for entry in Walker::new(Path::new("/srv/media"), config).walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

use jwalk::WalkDir;

use super::{ExcludeMatcher, FileEntry, ScanCounters, ScanError};
use crate::signal::CancelToken;

/// Walk filters.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Files smaller than this are skipped
    pub min_size: u64,
    /// Paths to skip; matching directories are pruned
    pub exclude: Arc<ExcludeMatcher>,
}

/// Streaming directory walker.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    cancel: Option<CancelToken>,
    counters: Arc<ScanCounters>,
}

impl Walker {
    /// Walker over `root`.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            cancel: None,
            counters: Arc::new(ScanCounters::default()),
        }
    }

    /// Stop yielding entries once `token` is cancelled.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Record exclusions and size rejections into shared counters.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<ScanCounters>) -> Self {
        self.counters = counters;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Walk the tree.
    ///
    /// Per-entry failures are yielded as [`ScanError`] values; iteration
    /// continues past them.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let exclude = Arc::clone(&self.config.exclude);
        let counters = Arc::clone(&self.counters);

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(false)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) if entry.file_type().is_dir() => {
                        let path = entry.path();
                        if exclude.should_exclude_dir(&path) {
                            log::debug!("Pruning excluded directory: {}", path.display());
                            counters.dirs_pruned.fetch_add(1, Ordering::Relaxed);
                            false
                        } else {
                            true
                        }
                    }
                    _ => true,
                });
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir
            .into_iter()
            .take_while(move |_| {
                if self.is_cancelled() {
                    log::debug!("Walker: cancellation requested, stopping");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    let path = entry.path();
                    if file_type.is_symlink() {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }
                    self.process_file(path)
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            })
    }

    fn process_file(&self, path: PathBuf) -> Option<Result<FileEntry, ScanError>> {
        if path.to_str().is_none() {
            log::warn!("Skipping path that is not valid UTF-8: {}", path.display());
            self.counters.non_utf8.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if self.config.exclude.should_exclude(&path) {
            log::trace!("Excluded: {}", path.display());
            self.counters.excluded.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => return Some(Err(ScanError::from_io(&path, e))),
        };
        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if size < self.config.min_size {
            log::trace!("Below minimum size ({} bytes): {}", size, path.display());
            self.counters.too_small.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let relative = path
            .strip_prefix(&self.root)
            .map_or_else(|_| path.clone(), Path::to_path_buf);
        Some(Ok(FileEntry {
            relative,
            size,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        }))
    }
}
