// src/report.rs

//! Reporting sink for everything an activity wants to tell the user.
//!
//! The engine never prints. It hands a [`Report`] to a [`Reporter`] and moves
//! on; how the report is rendered or stored is up to the implementation.
//! Production uses [`TracingReporter`], which turns reports into `tracing`
//! events tagged with the activity name.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Lifecycle phase of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    Main,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => f.write_str("before"),
            Phase::Main => f.write_str("main"),
            Phase::After => f.write_str("after"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Report {
    /// A subtree could not be indexed.
    IndexingError { path: PathBuf, message: String },
    /// Absolute-path resolution or glob expansion failed during validation.
    ResolveError { path: PathBuf, message: String },
    /// The watcher backend reported an error.
    WatchError { message: String },
    /// Raw filesystem event, before any filtering.
    FileChanged { path: PathBuf },
    /// A file change restarted the pipeline.
    Changed { path: PathBuf },
    /// A file removal restarted the pipeline.
    Removed { path: PathBuf },
    /// A phase started running.
    Phase { phase: Phase },
    CommandStarted { label: String },
    CommandFinished {
        label: String,
        elapsed: Duration,
        status: Option<ExitStatus>,
    },
    /// A command could not be run at all.
    CommandError { label: String, message: String },
    /// A non-empty stdout line. `log` mirrors the command's `log` flag.
    Output { label: String, line: String, log: bool },
    /// A non-empty stderr line. Observational only.
    ErrorOutput { label: String, line: String, log: bool },
}

/// Sink for [`Report`]s.
///
/// Implementations must not block: reports are emitted from the event loop
/// and from output-streaming tasks.
pub trait Reporter: Send + Sync {
    fn report(&self, report: Report);
}

/// Format elapsed time the way finish reports show it: seconds, three decimals.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

/// Reporter that emits `tracing` events.
#[derive(Debug, Clone)]
pub struct TracingReporter {
    activity: String,
}

impl TracingReporter {
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
        }
    }
}

impl Reporter for TracingReporter {
    fn report(&self, report: Report) {
        let activity = self.activity.as_str();
        match report {
            Report::IndexingError { path, message } => {
                error!(activity, path = %path.display(), "indexing: {message}");
            }
            Report::ResolveError { path, message } => {
                warn!(activity, path = %path.display(), "cannot resolve path: {message}");
            }
            Report::WatchError { message } => {
                error!(activity, "watch error: {message}");
            }
            Report::FileChanged { path } => {
                debug!(activity, path = %path.display(), "file changed");
            }
            Report::Changed { path } => {
                info!(activity, path = %path.display(), "changed");
            }
            Report::Removed { path } => {
                info!(activity, path = %path.display(), "removed");
            }
            Report::Phase { phase } => {
                debug!(activity, %phase, "running phase");
            }
            Report::CommandStarted { label } => {
                info!(activity, cmd = %label, "running");
            }
            Report::CommandFinished {
                label,
                elapsed,
                status,
            } => {
                let code = status.and_then(|s| s.code());
                info!(
                    activity,
                    cmd = %label,
                    exit_code = ?code,
                    "finished in {}",
                    format_elapsed(elapsed)
                );
            }
            Report::CommandError { label, message } => {
                error!(activity, cmd = %label, "command failed: {message}");
            }
            Report::Output { label, line, log } => {
                info!(activity, cmd = %label, log, "{line}");
            }
            Report::ErrorOutput { label, line, log } => {
                warn!(activity, cmd = %label, log, "{line}");
            }
        }
    }
}
