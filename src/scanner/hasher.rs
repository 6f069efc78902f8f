//! BLAKE3 content hashing.
//!
//! # Overview
//!
//! The index uses two digests per file:
//!
//! - the **partial hash**, BLAKE3 of the first [`PARTIAL_HASH_SIZE`] bytes,
//!   cheap enough to compute for every file and used to find candidates
//! - the **full hash**, BLAKE3 of the entire content, which confirms a
//!   candidate is a real duplicate
//!
//! Files shorter than the limit are simply hashed in full; a short read is
//! never an error. Digests are lowercase hex strings.
//!
//! # Example
//!
//! ```no_run
//! use dupindex::scanner::{Hasher, HashLimit};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let prefix = hasher.hash(Path::new("movie.mkv"), HashLimit::Bytes(4096))?;
//! let full = hasher.full_hash(Path::new("movie.mkv"))?;
//! # Ok::<(), dupindex::scanner::HashError>(())
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::HashError;

/// Bytes read for the partial hash (100 KiB).
pub const PARTIAL_HASH_SIZE: u64 = 100 * 1024;

/// Files at least this large use the memory-mapped path when enabled.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

/// How much of a file to hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashLimit {
    /// The entire file
    Full,
    /// At most this many bytes from the start
    Bytes(u64),
}

impl HashLimit {
    /// Convert a signed limit where any negative value means the whole file.
    #[must_use]
    pub fn from_signed(limit: i64) -> Self {
        u64::try_from(limit).map_or(Self::Full, Self::Bytes)
    }
}

/// File hasher. Stateless apart from its settings, so one instance is
/// shared by every worker.
#[derive(Debug, Clone)]
pub struct Hasher {
    use_mmap: bool,
    mmap_threshold: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Streaming hasher with memory mapping disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_mmap: false,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }

    /// Enable or disable multi-threaded memory-mapped hashing for large
    /// full-file hashes. Digests are identical either way.
    #[must_use]
    pub fn with_mmap(mut self, enabled: bool) -> Self {
        self.use_mmap = enabled;
        self
    }

    /// Minimum file size for the memory-mapped path.
    #[must_use]
    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    /// Whether memory mapping is enabled.
    #[must_use]
    pub fn mmap_enabled(&self) -> bool {
        self.use_mmap
    }

    /// Hash a file, reading at most `limit`.
    ///
    /// # Errors
    ///
    /// [`HashError`] when the file cannot be opened or read. Reaching end
    /// of file before `limit` is not an error.
    pub fn hash(&self, path: &Path, limit: HashLimit) -> Result<String, HashError> {
        let file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let mut hasher = blake3::Hasher::new();

        match limit {
            HashLimit::Bytes(n) => {
                hasher
                    .update_reader(file.take(n))
                    .map_err(|e| map_io_error(path, e))?;
            }
            HashLimit::Full if self.should_mmap(&file) => {
                drop(file);
                log::trace!("Hashing {} via mmap", path.display());
                hasher
                    .update_mmap_rayon(path)
                    .map_err(|e| map_io_error(path, e))?;
            }
            HashLimit::Full => {
                hasher
                    .update_reader(file)
                    .map_err(|e| map_io_error(path, e))?;
            }
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// BLAKE3 of the first [`PARTIAL_HASH_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// See [`Hasher::hash`].
    pub fn partial_hash(&self, path: &Path) -> Result<String, HashError> {
        self.hash(path, HashLimit::Bytes(PARTIAL_HASH_SIZE))
    }

    /// BLAKE3 of the whole file.
    ///
    /// # Errors
    ///
    /// See [`Hasher::hash`].
    pub fn full_hash(&self, path: &Path) -> Result<String, HashError> {
        self.hash(path, HashLimit::Full)
    }

    fn should_mmap(&self, file: &File) -> bool {
        self.use_mmap
            && file
                .metadata()
                .is_ok_and(|m| m.is_file() && m.len() >= self.mmap_threshold)
    }
}

/// Classify an I/O error for `path`.
pub(crate) fn map_io_error(path: &Path, error: io::Error) -> HashError {
    match error.kind() {
        io::ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
