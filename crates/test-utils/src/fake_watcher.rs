use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use watchrun::watch::{FileWatcher, FsEvent, FsOp, WatchStreams};

#[derive(Debug, Default)]
struct Shared {
    registered: Mutex<Vec<PathBuf>>,
    removed: Mutex<Vec<PathBuf>>,
    closed: AtomicBool,
}

/// In-memory [`FileWatcher`]: records registrations and lets the test inject
/// events and errors through a [`FakeWatcherHandle`].
#[derive(Debug)]
pub struct FakeWatcher {
    shared: Arc<Shared>,
}

/// Test-side end of a [`FakeWatcher`].
#[derive(Debug, Clone)]
pub struct FakeWatcherHandle {
    events: mpsc::UnboundedSender<FsEvent>,
    errors: mpsc::UnboundedSender<notify::Error>,
    shared: Arc<Shared>,
}

impl FakeWatcher {
    pub fn new() -> (FakeWatcher, WatchStreams, FakeWatcherHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        (
            FakeWatcher {
                shared: Arc::clone(&shared),
            },
            WatchStreams { events, errors },
            FakeWatcherHandle {
                events: events_tx,
                errors: errors_tx,
                shared,
            },
        )
    }
}

impl FileWatcher for FakeWatcher {
    fn walk(&mut self, path: &Path, register: bool) -> PathBuf {
        if register {
            self.shared.registered.lock().unwrap().push(path.to_path_buf());
        }
        path.to_path_buf()
    }

    fn remove(&mut self, path: &Path) {
        self.shared.removed.lock().unwrap().push(path.to_path_buf());
    }

    fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

impl FakeWatcherHandle {
    pub fn send(&self, path: impl Into<PathBuf>, op: FsOp) {
        let _ = self.events.send(FsEvent::new(path, op));
    }

    pub fn send_error(&self, message: &str) {
        let _ = self.errors.send(notify::Error::generic(message));
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.shared.registered.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.shared.removed.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
