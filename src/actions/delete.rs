//! Removing duplicate files from disk.
//!
//! Two modes: permanent removal (the default for `delete`) and moving the
//! file to the system trash via the `trash` crate. Before a file is removed
//! it is checked against what the index recorded, so a file rewritten since
//! it was hashed is never deleted as a duplicate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a duplicate is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Unlink the file
    #[default]
    Permanent,
    /// Move the file to the system trash
    Trash,
}

/// Why a duplicate was not removed.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Gone before we got to it.
    #[error("{0} no longer exists")]
    NotFound(PathBuf),

    #[error("no permission to remove {0}")]
    PermissionDenied(PathBuf),

    /// Size or mtime differ from the index record.
    #[error("{path} changed since it was indexed ({reason})")]
    Stale { path: PathBuf, reason: &'static str },

    /// The unlink or the move to the trash failed.
    #[error("could not remove {path} ({mode:?}): {message}")]
    Removal {
        path: PathBuf,
        mode: DeleteMode,
        message: String,
    },

    /// The selection would remove every copy in a group.
    #[error("refusing to remove every copy of a group")]
    NoCopyLeft,

    /// Stat failed for another reason.
    #[error("cannot stat {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// The file this error is about, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(path) | Self::PermissionDenied(path) => Some(path),
            Self::Stale { path, .. } | Self::Removal { path, .. } | Self::Io { path, .. } => {
                Some(path)
            }
            Self::NoCopyLeft => None,
        }
    }

    fn stat(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source },
        }
    }
}

/// A file that was removed.
#[derive(Debug, Clone)]
pub struct DeleteResult {
    /// Removed path
    pub path: PathBuf,
    /// Bytes freed
    pub size: u64,
    pub mode: DeleteMode,
}

/// What the index expects a file to look like.
#[derive(Debug, Clone, Copy)]
pub struct Expected {
    /// Recorded size
    pub size: u64,
    /// Recorded modification time
    pub modified: Option<SystemTime>,
}

impl Expected {
    fn check(&self, path: &Path, metadata: &fs::Metadata) -> Result<(), DeleteError> {
        let reason = if metadata.len() != self.size {
            Some("size differs")
        } else {
            match (self.modified, metadata.modified()) {
                (Some(recorded), Ok(current)) if recorded != current => Some("mtime differs"),
                _ => None,
            }
        };
        match reason {
            Some(reason) => {
                log::warn!("Not removing {}: {reason} from the index record", path.display());
                Err(DeleteError::Stale {
                    path: path.to_path_buf(),
                    reason,
                })
            }
            None => Ok(()),
        }
    }
}

/// Remove one file, optionally checking it against its indexed state first.
///
/// # Errors
///
/// - `NotFound` / `PermissionDenied` / `Io` when the file cannot be examined
/// - `Stale` when it no longer matches `expected`
/// - `Removal` when the unlink or trash move fails
pub fn delete_file(
    path: &Path,
    mode: DeleteMode,
    expected: Option<Expected>,
) -> Result<DeleteResult, DeleteError> {
    let metadata = fs::metadata(path).map_err(|e| DeleteError::stat(path, e))?;
    if let Some(expected) = expected {
        expected.check(path, &metadata)?;
    }

    let removed = match mode {
        DeleteMode::Permanent => fs::remove_file(path).map_err(|e| e.to_string()),
        DeleteMode::Trash => trash::delete(path).map_err(|e| e.to_string()),
    };
    if let Err(message) = removed {
        log::error!("Could not remove {} ({mode:?}): {message}", path.display());
        return Err(DeleteError::Removal {
            path: path.to_path_buf(),
            mode,
            message,
        });
    }
    log::info!(
        "Removed duplicate {} ({} bytes, {mode:?})",
        path.display(),
        metadata.len()
    );

    Ok(DeleteResult {
        path: path.to_path_buf(),
        size: metadata.len(),
        mode,
    })
}

/// Refuse a selection that leaves no member of `group` behind.
///
/// # Errors
///
/// [`DeleteError::NoCopyLeft`].
pub fn validate_preserves_copy(selected: &[&str], group: &[&str]) -> Result<(), DeleteError> {
    if group.iter().all(|member| selected.contains(member)) {
        log::error!("Selection covers all {} members of a group", group.len());
        return Err(DeleteError::NoCopyLeft);
    }
    Ok(())
}
