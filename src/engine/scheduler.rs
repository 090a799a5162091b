// src/engine/scheduler.rs

//! Event loop of one activity.
//!
//! Lifecycle: index the watch roots while the before-phase runs, launch the
//! main pipeline, then react to filesystem events until the termination
//! signal arrives, at which point the main pipeline is cancelled and the
//! after-phase runs to completion.
//!
//! The loop is the single writer of the activity's [`Generation`]. Each
//! restart rotates it, which cancels everything still running under the old
//! token, and spawns a new main run that first waits for the old one to
//! finish tearing down.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::engine::debounce::Debounce;
use crate::errors::Result;
use crate::exec::{CancelToken, CommandExecutor, Generation, TaskRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::report::{Phase, Report, Reporter};
use crate::types::{Activity, TaskNode};
use crate::watch::filter::extension_of;
use crate::watch::{
    FileWatcher, FsEvent, FsOp, Index, Indexer, PathFilter, Validation, WatchStreams,
};

/// Source of "now" for debouncing.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Drives one activity from start-up to shutdown.
pub struct ActivityScheduler {
    activity: Activity,
    watcher: Box<dyn FileWatcher>,
    streams: WatchStreams,
    executor: Arc<dyn CommandExecutor>,
    reporter: Arc<dyn Reporter>,
    fs: Arc<dyn FileSystem>,
    base_dir: Option<PathBuf>,
    clock: Clock,
}

impl fmt::Debug for ActivityScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityScheduler")
            .field("activity", &self.activity.name)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl ActivityScheduler {
    pub fn new(
        activity: Activity,
        watcher: Box<dyn FileWatcher>,
        streams: WatchStreams,
        executor: Arc<dyn CommandExecutor>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            activity,
            watcher,
            streams,
            executor,
            reporter,
            fs: Arc::new(RealFileSystem),
            base_dir: None,
            clock: Arc::new(SystemTime::now),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Directory standing in for the working directory when resolving and
    /// bounding paths. Defaults to the process working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run the activity until `shutdown` resolves.
    ///
    /// Returns the index as it stood when the watcher was closed.
    pub async fn run<F>(self, shutdown: F) -> Result<Index>
    where
        F: Future<Output = ()>,
    {
        let ActivityScheduler {
            activity,
            watcher,
            streams,
            executor,
            reporter,
            fs,
            base_dir,
            clock,
        } = self;

        let base = match base_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        info!(activity = %activity.name, base = %base.display(), "starting activity");

        let filter = PathFilter::new(
            &activity.watch,
            &activity.ignore,
            base,
            Arc::clone(&fs),
            Arc::clone(&reporter),
        );
        let indexer = Arc::new(Mutex::new(Indexer::new(
            filter.clone(),
            Arc::clone(&fs),
            watcher,
            Arc::clone(&reporter),
        )));
        let runner = TaskRunner::new(executor, Arc::clone(&reporter));
        let generation = Generation::new();

        // Indexing runs on a blocking thread while the before-phase runs here.
        let indexing = {
            let indexer = Arc::clone(&indexer);
            let roots = activity.watch.paths.clone();
            tokio::task::spawn_blocking(move || {
                lock(&indexer).index_roots(&roots);
            })
        };

        reporter.report(Report::Phase {
            phase: Phase::Before,
        });
        runner.run(&generation.token(), &activity.before).await;
        indexing
            .await
            .map_err(|e| anyhow!("indexing task failed: {e}"))?;

        let mut event_loop = EventLoop {
            name: activity.name.clone(),
            tasks: Arc::new(activity.tasks),
            after: activity.after,
            filter,
            indexer,
            runner,
            reporter,
            generation,
            current_run: None,
            debounce: Debounce::new(),
            clock,
        };

        let first = event_loop.generation.token();
        event_loop.launch(first);

        let WatchStreams {
            mut events,
            mut errors,
        } = streams;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(activity = %event_loop.name, "termination requested");
                    break;
                }
                Some(event) = events.recv() => event_loop.handle_event(event).await,
                Some(err) = errors.recv() => event_loop.reporter.report(Report::WatchError {
                    message: err.to_string(),
                }),
            }
        }

        Ok(event_loop.finish().await)
    }
}

/// Mutable state of a running activity.
struct EventLoop {
    name: String,
    tasks: Arc<Vec<TaskNode>>,
    after: Vec<TaskNode>,
    filter: PathFilter,
    indexer: Arc<Mutex<Indexer>>,
    runner: TaskRunner,
    reporter: Arc<dyn Reporter>,
    generation: Generation,
    current_run: Option<JoinHandle<()>>,
    debounce: Debounce,
    clock: Clock,
}

impl EventLoop {
    async fn handle_event(&mut self, event: FsEvent) {
        self.reporter.report(Report::FileChanged {
            path: event.path.clone(),
        });

        match event.op {
            FsOp::Remove => {
                lock(&self.indexer).watcher_mut().remove(&event.path);
                if self.filter.validate(&event.path).is_accepted()
                    && extension_of(&event.path).is_some()
                {
                    self.reporter.report(Report::Removed { path: event.path });
                    self.restart();
                }
            }
            FsOp::Create | FsOp::Write | FsOp::Rename => match self.filter.validate(&event.path) {
                Validation::Rejected => {
                    trace!(path = %event.path.display(), "event path rejected");
                }
                validation if validation.is_dir() => self.reindex(event.path).await,
                Validation::Accepted(_) => {
                    if self.debounce.accept((self.clock)()) {
                        self.reporter.report(Report::Changed { path: event.path });
                        self.restart();
                    } else {
                        debug!(path = %event.path.display(), "debounced");
                    }
                }
            },
        }
    }

    /// Index a newly created directory without touching the current run.
    async fn reindex(&mut self, dir: PathBuf) {
        let indexer = Arc::clone(&self.indexer);
        let walked = tokio::task::spawn_blocking(move || {
            lock(&indexer).walk(&dir);
        })
        .await;
        if let Err(err) = walked {
            self.reporter.report(Report::IndexingError {
                path: PathBuf::new(),
                message: format!("indexing task failed: {err}"),
            });
        }
    }

    fn restart(&mut self) {
        let token = self.generation.rotate();
        debug!(activity = %self.name, generation = token.epoch(), "restarting pipeline");
        self.launch(token);
    }

    /// Spawn a main run under `token`.
    ///
    /// The new run waits for the previous one, so processes from the old
    /// generation are reaped before any command of the new one starts.
    fn launch(&mut self, token: CancelToken) {
        let previous = self.current_run.take();
        let runner = self.runner.clone();
        let tasks = Arc::clone(&self.tasks);
        let reporter = Arc::clone(&self.reporter);

        self.current_run = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    warn!(error = %err, "previous pipeline run ended abnormally");
                }
            }
            if token.is_retired() {
                return;
            }
            reporter.report(Report::Phase { phase: Phase::Main });
            runner.run(&token, &tasks).await;
        }));
    }

    /// Cancel the main pipeline, wait for it, then run the after-phase.
    async fn finish(mut self) -> Index {
        self.generation.retire();
        if let Some(run) = self.current_run.take() {
            if let Err(err) = run.await {
                warn!(activity = %self.name, error = %err, "main pipeline ended abnormally");
            }
        }

        let token = self.generation.rotate();
        self.reporter.report(Report::Phase {
            phase: Phase::After,
        });
        self.runner.run(&token, &self.after).await;
        self.generation.retire();

        let index = lock(&self.indexer).close();
        info!(activity = %self.name, "activity stopped");
        index
    }
}

fn lock(indexer: &Mutex<Indexer>) -> MutexGuard<'_, Indexer> {
    // A panic mid-walk leaves a usable, if partial, index.
    indexer.lock().unwrap_or_else(|e| e.into_inner())
}
