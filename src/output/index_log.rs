//! Plain index log.
//!
//! One line per indexed file under the root, written with the `csv` crate:
//!
//! - [`LogOrder::Size`] (`fav.log`): `<size>,"./<relative>"`, largest first
//! - [`LogOrder::ModTime`] (`fav.log.sort`): `"./<relative>"`, newest first
//!
//! Ties sort by path so the output is reproducible.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::duplicates::report::display_path;
use crate::store::{FileRecord, MetadataStore, StoreError};

/// Default file name of the size-ordered log.
pub const SIZE_LOG_NAME: &str = "fav.log";
/// Default file name of the mtime-ordered log.
pub const TIME_LOG_NAME: &str = "fav.log.sort";

/// Errors writing the index log.
#[derive(Debug, Error)]
pub enum IndexLogError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Records could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Line order of an index log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogOrder {
    /// Size descending, with the size column
    Size,
    /// Modification time descending, path only
    ModTime,
}

impl LogOrder {
    /// Conventional file name for this order.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Size => SIZE_LOG_NAME,
            Self::ModTime => TIME_LOG_NAME,
        }
    }
}

#[derive(Debug, Serialize)]
struct SizeRow<'a> {
    size: u64,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct PathRow<'a> {
    path: &'a str,
}

/// Write the records under `root` to `writer` in `order`.
///
/// Returns the number of lines written.
///
/// # Errors
///
/// Returns `IndexLogError` if writing or serialization fails.
pub fn write_index_log<W: io::Write>(
    writer: W,
    root: &Path,
    records: &[FileRecord],
    order: LogOrder,
) -> Result<usize, IndexLogError> {
    let mut rows: Vec<(&FileRecord, String)> = records
        .par_iter()
        .filter(|r| Path::new(&r.path).starts_with(root))
        .map(|r| (r, display_path(root, &r.path)))
        .collect();
    match order {
        LogOrder::Size => {
            rows.par_sort_by(|(a, pa), (b, pb)| b.size.cmp(&a.size).then_with(|| pa.cmp(pb)));
        }
        LogOrder::ModTime => {
            rows.par_sort_by(|(a, pa), (b, pb)| b.mod_time.cmp(&a.mod_time).then_with(|| pa.cmp(pb)));
        }
    }

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::NonNumeric)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for (record, path) in &rows {
        match order {
            LogOrder::Size => csv_writer.serialize(SizeRow {
                size: record.size,
                path,
            })?,
            LogOrder::ModTime => csv_writer.serialize(PathRow { path })?,
        }
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

/// Write both logs into `dir`, returning the files written.
///
/// # Errors
///
/// Returns `IndexLogError` if records cannot be loaded or a file cannot be
/// written.
pub fn write_index_logs(
    dir: &Path,
    store: &MetadataStore,
    root: &Path,
) -> Result<Vec<PathBuf>, IndexLogError> {
    let records = store.records()?;
    let mut written = Vec::new();
    for order in [LogOrder::Size, LogOrder::ModTime] {
        let path = dir.join(order.file_name());
        let lines = write_index_log(BufWriter::new(File::create(&path)?), root, &records, order)?;
        log::info!("Wrote {} entries to {}", lines, path.display());
        written.push(path);
    }
    Ok(written)
}
