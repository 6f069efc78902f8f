//! Progress reporting using indicatif.
//!
//! [`ScanProgress`] owns a spinner and a reporter thread that polls the
//! scanner's [`ScanCounters`] snapshot; the scan itself never touches the
//! terminal.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled the spinner has no animation and
//! refreshes less often, which suits screen readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::scanner::{ScanCounters, ScanSnapshot};

/// Spinner that mirrors a running scan.
pub struct ScanProgress {
    bar: ProgressBar,
    done: Arc<AtomicBool>,
    reporter: Option<JoinHandle<()>>,
}

impl ScanProgress {
    /// Start reporting `counters`. A quiet reporter draws nothing.
    #[must_use]
    pub fn start(counters: Arc<ScanCounters>, quiet: bool, accessible: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            new_spinner(accessible)
        };
        let done = Arc::new(AtomicBool::new(false));
        let interval = if accessible { 500 } else { 100 };

        let reporter = {
            let bar = bar.clone();
            let done = Arc::clone(&done);
            thread::Builder::new()
                .name("progress".into())
                .spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let snapshot = counters.snapshot();
                        bar.set_position(snapshot.finished() as u64);
                        bar.set_message(scan_message(&snapshot));
                        thread::sleep(Duration::from_millis(interval));
                    }
                })
                .map_err(|e| log::debug!("Progress reporter not started: {e}"))
                .ok()
        };

        Self {
            bar,
            done,
            reporter,
        }
    }

    /// Stop the reporter and leave a final line.
    pub fn finish(mut self, snapshot: &ScanSnapshot) {
        self.stop();
        self.bar.set_position(snapshot.finished() as u64);
        self.bar.finish_with_message(scan_message(snapshot));
    }

    fn stop(&mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(handle) = self.reporter.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScanProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spinner for a pass with no counters (resolving, reclaiming).
#[must_use]
pub fn phase_spinner(message: &str, quiet: bool, accessible: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = new_spinner(accessible);
    bar.set_message(message.to_string());
    bar
}

fn new_spinner(accessible: bool) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if accessible {
        bar.set_style(
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(500));
    } else {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
    }
    bar
}

fn scan_message(s: &ScanSnapshot) -> String {
    format!(
        "Indexing: {}/{} done, {} hashed, {} unchanged, {} excluded, {} errors",
        s.finished(),
        s.submitted,
        s.hashed,
        s.already_indexed,
        s.excluded,
        s.errors
    )
}
