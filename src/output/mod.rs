//! Output files derived from the index.
//!
//! The duplicate report lives with the resolver in
//! [`crate::duplicates::report`]; this module holds the plain index log.

pub mod index_log;

pub use index_log::{write_index_log, write_index_logs, IndexLogError, LogOrder};
