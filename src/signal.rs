//! Cooperative cancellation and Ctrl+C handling.
//!
//! A [`CancelToken`] is created once per run and handed to every component
//! that dispatches work: the scanner's walk loop, and each
//! [`WorkerPool`](crate::pool::WorkerPool). Workers check the token *before*
//! starting a task and never while one runs, so a cancelled run always leaves
//! each file either fully indexed or untouched.
//!
//! ```rust,no_run
//! use dupindex::signal::install_handler;
//!
//! let token = install_handler().expect("signal handler");
//! if token.is_cancelled() {
//!     return;
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for SIGINT (Ctrl+C) interruption, 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation signal.
///
/// Cloning is cheap and every clone observes the same state. Once
/// cancelled a token stays cancelled; create a new one for a new run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Install a Ctrl+C handler that cancels the returned token.
///
/// The process can only hold one handler. When one is already installed
/// (a second `run_app` in the same test binary, for example) an unhooked
/// token is returned instead; it still works for manual [`CancelToken::cancel`].
///
/// # Errors
///
/// Returns [`SignalError`] only for failures other than "already installed".
pub fn install_handler() -> Result<CancelToken, SignalError> {
    let token = CancelToken::new();
    let hooked = token.clone();

    match ctrlc::set_handler(move || {
        hooked.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight files...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    }) {
        Ok(()) => Ok(token),
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using unhooked token");
            Ok(CancelToken::new())
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
