//! Command-line interface definitions for dupindex.
//!
//! Global options (verbosity, config, store selection, pool sizing) apply
//! to every subcommand. Each subcommand is one pass over the index.
//!
//! # Example
//!
//! ```bash
//! # Index everything above 200 MiB under ~/Videos
//! dupindex scan ~/Videos
//!
//! # Group identical files, then write fav.log.dup
//! dupindex find ~/Videos
//! dupindex report ~/Videos
//!
//! # Remove every non-canonical copy, to the trash
//! dupindex delete ~/Videos --mode trash --yes
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::actions::DeleteMode;
use crate::config::ConfigOverrides;
use crate::output::LogOrder;
use crate::store::StoreKind;

/// Content-addressable file index with duplicate detection.
///
/// dupindex records every large file under a directory in a persistent
/// index keyed by BLAKE3 content hashes, groups identical files, and picks
/// one canonical copy per group to keep.
#[derive(Debug, Parser)]
#[command(name = "dupindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Plain progress output without animation
    #[arg(long, global = true)]
    pub accessible: bool,

    /// Config file to use instead of the platform default
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Index backend (sqlite or memory)
    #[arg(long, value_name = "BACKEND", global = true)]
    pub store: Option<StoreKind>,

    /// SQLite database file
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Worker threads per pool
    #[arg(short = 'j', long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Maximum files open at once across all workers
    #[arg(long, value_name = "N", global = true)]
    pub max_open_files: Option<usize>,

    /// Never memory-map files while hashing
    #[arg(long, global = true)]
    pub no_mmap: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index the files under a directory
    Scan(ScanArgs),
    /// Build duplicate groups from indexed files
    Find(FindArgs),
    /// Write the duplicate report
    Report(ReportArgs),
    /// Delete every non-canonical duplicate
    Delete(DeleteArgs),
    /// Remove index entries for files that no longer exist
    Reclaim,
    /// Write the plain index log
    Export(ExportArgs),
    /// Print the effective configuration
    Config,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Minimum file size to index (e.g., 1KB, 200MiB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Record size and mtime only, without hashing
    #[arg(long)]
    pub no_hash: bool,

    /// File with one exclude pattern per line
    #[arg(long, value_name = "PATH")]
    pub exclude_file: Option<PathBuf>,

    /// Exclude pattern (`*` matches anything); can be repeated
    #[arg(short = 'e', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Skip the stale-entry sweep before scanning
    #[arg(long)]
    pub no_reclaim: bool,

    /// Directory for fav.log and fav.log.sort (default: the scanned root)
    #[arg(long, value_name = "DIR", conflicts_with = "no_log")]
    pub log_dir: Option<PathBuf>,

    /// Do not write the index logs
    #[arg(long)]
    pub no_log: bool,
}

/// Arguments for the find subcommand.
#[derive(Debug, Args)]
pub struct FindArgs {
    /// Only files under this directory are grouped
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Stop after this many groups (0 for no limit)
    #[arg(long, value_name = "N")]
    pub max_groups: Option<usize>,
}

/// Arguments for the report subcommand.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Root that report paths are relative to
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Report file (default: fav.log.dup in the root)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the report to stdout instead of a file
    #[arg(long, conflicts_with = "output")]
    pub stdout: bool,
}

/// Arguments for the delete subcommand.
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Only groups under this directory are considered
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Delete permanently or move to the system trash
    #[arg(long, value_enum)]
    pub mode: Option<DeleteMode>,

    /// Process at most this many groups (0 for no limit)
    #[arg(long, value_name = "N")]
    pub max_groups: Option<usize>,

    /// List what would be deleted without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Confirm deletion; required unless --dry-run
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the export subcommand.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Root that log paths are relative to
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Line order
    #[arg(long, value_enum, default_value = "size")]
    pub order: LogOrder,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Command-line values that override configuration layers.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            store: self.store,
            db_path: self.db.clone(),
            workers: self.workers,
            max_open_files: self.max_open_files,
            use_mmap: self.no_mmap.then_some(false),
            ..ConfigOverrides::default()
        };
        match &self.command {
            Commands::Scan(args) => {
                overrides.min_size = args.min_size;
                overrides.exclude_file.clone_from(&args.exclude_file);
                overrides.reclaim_on_scan = args.no_reclaim.then_some(false);
            }
            Commands::Find(args) => overrides.max_groups = args.max_groups,
            Commands::Delete(args) => {
                overrides.max_groups = args.max_groups;
                overrides.delete_mode = args.mode;
            }
            _ => {}
        }
        overrides
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupindex::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("200MiB").unwrap(), 209_715_200);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
