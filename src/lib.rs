//! dupindex - content-addressable file index with duplicate detection.
//!
//! A scan walks a directory tree and records every eligible file in a
//! persistent key-value index, keyed by BLAKE3 digests of a 100 KiB prefix
//! and of the whole file. Later passes group identical files, choose one
//! canonical copy per group, report or delete the rest, and reclaim entries
//! for files that disappeared.

pub mod actions;
pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod pool;
pub mod progress;
pub mod reclaim;
pub mod scanner;
pub mod signal;
pub mod store;

pub use app::run_app;
