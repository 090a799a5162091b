use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use watchrun::report::{Phase, Report, Reporter};

/// Reporter that keeps every report in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the code
/// under test and inspect another.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Report) -> bool) -> usize {
        self.reports.lock().unwrap().iter().filter(|r| pred(r)).count()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Report::Phase { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// Paths from `Changed` reports, in order.
    pub fn changed(&self) -> Vec<PathBuf> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Report::Changed { path } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(label, line)` of every stdout line.
    pub fn output(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Report::Output { label, line, .. } => Some((label.clone(), line.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn error_output(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Report::ErrorOutput { label, line, .. } => Some((label.clone(), line.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}
