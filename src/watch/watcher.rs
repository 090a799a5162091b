// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::WatchBackend;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Create,
    Write,
    Remove,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub op: FsOp,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, op: FsOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Event and error streams of a watcher.
///
/// Handed out once, next to the watcher, so the event loop can wait on both
/// streams while still calling into the watcher.
#[derive(Debug)]
pub struct WatchStreams {
    pub events: mpsc::UnboundedReceiver<FsEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Watcher capability used by the indexer and the event loop.
///
/// Any backend that can register paths and later emit [`FsEvent`]s for them
/// fits; the engine does not care whether events are native or polled.
pub trait FileWatcher: Send {
    /// Normalize `path` and, if `register` is set, start observing it.
    fn walk(&mut self, path: &Path, register: bool) -> PathBuf;

    /// Stop observing `path` (and anything registered beneath it).
    fn remove(&mut self, path: &Path);

    /// Stop observing everything. The streams end once the backend is gone.
    fn close(&mut self);
}

/// [`FileWatcher`] backed by `notify`.
///
/// Directories are registered non-recursively; the indexer walks into the
/// ones that pass the filter, so rejected subtrees never get a watch. Files
/// are registered only when their parent directory is not already watched.
pub struct NotifyWatcher {
    inner: Option<Box<dyn Watcher + Send>>,
    errors_tx: Option<mpsc::UnboundedSender<notify::Error>>,
    watched: HashSet<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("watched", &self.watched.len())
            .finish_non_exhaustive()
    }
}

impl NotifyWatcher {
    pub fn new(backend: WatchBackend, fs: Arc<dyn FileSystem>) -> Result<(Self, WatchStreams)> {
        let (events_tx, events) = mpsc::unbounded_channel::<FsEvent>();
        let (errors_tx, errors) = mpsc::unbounded_channel::<notify::Error>();

        // Called synchronously by notify on its own thread.
        let handler = {
            let errors_tx = errors_tx.clone();
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(op) = classify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        // Receiver gone means the activity is shutting down.
                        let _ = events_tx.send(FsEvent { path, op });
                    }
                }
                Err(err) => {
                    let _ = errors_tx.send(err);
                }
            }
        };

        let inner: Box<dyn Watcher + Send> = match backend {
            WatchBackend::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
            WatchBackend::Poll { interval } => Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(interval),
            )?),
        };
        info!(?backend, "file watcher started");

        let watcher = Self {
            inner: Some(inner),
            errors_tx: Some(errors_tx),
            watched: HashSet::new(),
            fs,
        };
        Ok((watcher, WatchStreams { events, errors }))
    }

    fn register(&mut self, path: &Path) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        if self.watched.contains(path) {
            return;
        }
        if !self.fs.is_dir(path) {
            if let Some(parent) = path.parent() {
                if self.watched.contains(parent) {
                    return;
                }
            }
        }
        match inner.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.watched.insert(path.to_path_buf());
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to watch path");
                if let Some(tx) = &self.errors_tx {
                    let _ = tx.send(err);
                }
            }
        }
    }
}

impl FileWatcher for NotifyWatcher {
    fn walk(&mut self, path: &Path, register: bool) -> PathBuf {
        let normalized = self
            .fs
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf());
        if register {
            self.register(&normalized);
        }
        normalized
    }

    fn remove(&mut self, path: &Path) {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in gone {
            self.watched.remove(&p);
            if let Some(inner) = self.inner.as_mut() {
                // The backend usually drops watches on deleted paths by itself.
                if let Err(err) = inner.unwatch(&p) {
                    debug!(path = %p.display(), error = %err, "unwatch failed");
                }
            }
        }
    }

    fn close(&mut self) {
        self.watched.clear();
        self.inner = None;
        self.errors_tx = None;
        debug!("file watcher closed");
    }
}

/// Map a notify event kind onto the operations the engine reacts to.
///
/// Access and metadata-only changes are dropped.
pub fn classify(kind: &EventKind) -> Option<FsOp> {
    match kind {
        EventKind::Create(_) => Some(FsOp::Create),
        EventKind::Remove(_) => Some(FsOp::Remove),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FsOp::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) | EventKind::Any => Some(FsOp::Write),
        EventKind::Access(_) | EventKind::Other => None,
    }
}
