//! Duplicate detection and resolution.
//!
//! - [`scoring`]: which copy of a group is canonical
//! - [`resolver`]: building, listing and deleting `dupes:` groups
//! - [`report`]: the plain-text group report

pub mod report;
pub mod resolver;
pub mod scoring;

pub use report::{render_report, write_report, ReportError};
pub use resolver::{
    DeleteSummary, DuplicateGroup, DuplicateResolver, FindSummary, ResolveError, ResolverConfig,
    DEFAULT_MAX_GROUPS,
};
pub use scoring::{extract_timestamps, selection_score, timestamp_count, MAX_BASENAME_LEN, TIMESTAMP_WEIGHT};
