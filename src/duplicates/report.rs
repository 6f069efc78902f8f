//! Plain-text duplicate report.
//!
//! ```text
//! Duplicate files for fullHash <hash>:
//! [+] <size>,"./<relative path>"
//! [-] <size>,"./<relative path>"
//!
//! ```
//!
//! The `[+]` line is the copy that would be kept. Paths outside the root
//! are written absolute. Rendering never modifies the index.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::store::{index_key, MetadataStore, StoreError};

use super::DuplicateGroup;

/// Errors writing a report file.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    /// A record lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The report file could not be written.
    #[error("Cannot write report {path}: {source}")]
    Io {
        /// Report path
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Render `groups` as report lines, blank separator included.
///
/// # Errors
///
/// [`StoreError`] if a member's record cannot be read.
pub fn render_report(
    store: &MetadataStore,
    root: &Path,
    groups: &[DuplicateGroup],
) -> Result<Vec<String>, StoreError> {
    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("Duplicate files for fullHash {}:", group.full_hash));
        for (i, path) in group.paths().enumerate() {
            let marker = if i == 0 { '+' } else { '-' };
            let size = member_size(store, path)?;
            lines.push(format!("[{marker}] {size},{}", quoted(&display_path(root, path))));
        }
        lines.push(String::new());
    }
    Ok(lines)
}

/// Render and write the report to `path`.
///
/// # Errors
///
/// [`ReportError`] on lookup or write failure.
pub fn write_report(
    path: &Path,
    store: &MetadataStore,
    root: &Path,
    groups: &[DuplicateGroup],
) -> Result<usize, ReportError> {
    let lines = render_report(store, root, groups)?;
    let io_err = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for line in &lines {
        writeln!(out, "{line}").map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    log::info!("Wrote {} duplicate groups to {}", groups.len(), path.display());
    Ok(groups.len())
}

fn member_size(store: &MetadataStore, path: &str) -> Result<u64, StoreError> {
    let key = store.key_for_path(path)?.unwrap_or_else(|| index_key(path));
    Ok(match store.get_record(&key)? {
        Some(record) => record.size,
        None => std::fs::metadata(path).map_or(0, |m| m.len()),
    })
}

/// `./relative` under `root`, otherwise the path unchanged.
pub(crate) fn display_path(root: &Path, path: &str) -> String {
    match Path::new(path).strip_prefix(root) {
        Ok(rel) => format!("./{}", rel.to_string_lossy()),
        Err(_) => path.to_string(),
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
