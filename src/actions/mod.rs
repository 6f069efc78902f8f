//! File actions.
//!
//! Only deletion lives here: removing the non-canonical members of a
//! duplicate group, either permanently or to the system trash.
//!
//! ```no_run
//! use dupindex::actions::{delete_file, DeleteMode};
//! use std::path::Path;
//!
//! let result = delete_file(Path::new("/media/copy.mkv"), DeleteMode::Trash, None);
//! ```

pub mod delete;

pub use delete::{delete_file, validate_preserves_copy, DeleteError, DeleteMode, DeleteResult, Expected};
