//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the dupindex application.
///
/// - 0: Success (completed normally)
/// - 1: General error (unexpected failure, store unreachable, missing root)
/// - 2: No duplicates found (find/report/delete completed, nothing to do)
/// - 3: Partial success (completed with some non-fatal path-level errors)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: The command completed normally.
    Success = 0,
    /// General error: An unexpected or fatal error occurred.
    GeneralError = 1,
    /// No duplicates: The index holds no duplicate groups.
    NoDuplicates = 2,
    /// Partial success: Completed, but some files were skipped because of errors.
    PartialSuccess = 3,
    /// Interrupted: The run was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DI000",
            Self::GeneralError => "DI001",
            Self::NoDuplicates => "DI002",
            Self::PartialSuccess => "DI003",
            Self::Interrupted => "DI130",
        }
    }

    /// Pick the exit code for a finished run from its error count.
    #[must_use]
    pub fn from_error_count(errors: usize, interrupted: bool) -> Self {
        if interrupted {
            Self::Interrupted
        } else if errors > 0 {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DI001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
