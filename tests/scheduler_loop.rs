// tests/scheduler_loop.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use watchrun::engine::{ActivityScheduler, Clock};
use watchrun::errors::Result;
use watchrun::fs::mock::MockFileSystem;
use watchrun::report::{Phase, Report};
use watchrun::types::Activity;
use watchrun::watch::{FsOp, Index};
use watchrun_test_utils::{
    ActivityBuilder, FakeExecutor, FakeWatcher, FakeWatcherHandle, RecordingReporter, cmd,
    init_tracing, wait_until, with_timeout,
};

struct Harness {
    watcher: FakeWatcherHandle,
    executor: Arc<FakeExecutor>,
    reporter: RecordingReporter,
    seconds: Arc<AtomicU64>,
    stop: oneshot::Sender<()>,
    run: JoinHandle<Result<Index>>,
}

impl Harness {
    fn start(activity: Activity, fs: MockFileSystem, executor: FakeExecutor) -> Self {
        init_tracing();
        let executor = executor.into_arc();
        let reporter = RecordingReporter::new();
        let seconds = Arc::new(AtomicU64::new(1_000));
        let (watcher, streams, handle) = FakeWatcher::new();
        let (stop, stopped) = oneshot::channel::<()>();

        let clock = {
            let seconds = Arc::clone(&seconds);
            let clock: Clock =
                Arc::new(move || UNIX_EPOCH + Duration::from_secs(seconds.load(Ordering::SeqCst)));
            clock
        };
        let scheduler = ActivityScheduler::new(
            activity,
            Box::new(watcher),
            streams,
            executor.clone(),
            Arc::new(reporter.clone()),
        )
        .with_fs(Arc::new(fs))
        .with_base_dir("/proj")
        .with_clock(clock);

        let run = tokio::spawn(scheduler.run(async move {
            let _ = stopped.await;
        }));

        Harness {
            watcher: handle,
            executor,
            reporter,
            seconds,
            stop,
            run,
        }
    }

    fn tick(&self) {
        self.seconds.fetch_add(1, Ordering::SeqCst);
    }

    async fn wait_started(&self, cmd: &str, times: usize) {
        with_timeout(wait_until(|| self.executor.count_started(cmd) >= times)).await;
    }

    async fn wait_events(&self, n: usize) {
        with_timeout(wait_until(|| {
            self.reporter
                .count(|r| matches!(r, Report::FileChanged { .. }))
                >= n
        }))
        .await;
    }

    async fn shutdown(self) -> (Index, Arc<FakeExecutor>, RecordingReporter, FakeWatcherHandle) {
        let _ = self.stop.send(());
        let index = with_timeout(self.run).await.unwrap().unwrap();
        (index, self.executor, self.reporter, self.watcher)
    }
}

fn go_project() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/main.go", "package main");
    fs.add_file("/proj/README.md", "# proj");
    fs.add_file("/proj/internal/db.go", "package internal");
    fs
}

fn server_activity() -> Activity {
    ActivityBuilder::new("api")
        .watch_ext(&["go"])
        .before(cmd("go mod download"))
        .task(cmd("go build"))
        .task(cmd("server"))
        .after(cmd("cleanup"))
        .build()
}

#[tokio::test]
async fn source_change_restarts_and_docs_change_does_not() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    h.watcher.send("/proj/README.md", FsOp::Write);
    h.watcher.send("/proj/main.go", FsOp::Write);
    h.wait_started("server", 2).await;

    assert_eq!(h.reporter.changed(), vec![PathBuf::from("/proj/main.go")]);
    assert_eq!(h.executor.count_started("go build"), 2);

    let (_, executor, _, _) = h.shutdown().await;
    let epochs: Vec<u64> = executor
        .started()
        .into_iter()
        .filter(|i| i.cmd == "server")
        .map(|i| i.epoch)
        .collect();
    assert_eq!(epochs, vec![0, 1]);
}

#[tokio::test]
async fn old_run_is_torn_down_before_the_new_one_starts() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    h.watcher.send("/proj/main.go", FsOp::Write);
    h.wait_started("server", 2).await;

    // The first server finished before the second build started.
    let finished = h.executor.finished_cmds();
    assert!(finished.contains(&"server".to_string()), "{finished:?}");
    assert_eq!(h.executor.max_concurrent(), 1);
    h.shutdown().await;
}

#[tokio::test]
async fn changes_within_one_second_restart_once() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    h.watcher.send("/proj/main.go", FsOp::Write);
    h.watcher.send("/proj/internal/db.go", FsOp::Write);
    h.wait_events(2).await;
    h.wait_started("server", 2).await;
    assert_eq!(h.reporter.changed().len(), 1);

    h.tick();
    h.watcher.send("/proj/internal/db.go", FsOp::Write);
    h.wait_started("server", 3).await;
    assert_eq!(
        h.reporter.changed(),
        vec![
            PathBuf::from("/proj/main.go"),
            PathBuf::from("/proj/internal/db.go")
        ]
    );
    h.shutdown().await;
}

#[tokio::test]
async fn removing_a_watched_file_restarts_and_unregisters_it() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    h.watcher.send("/proj/internal/db.go", FsOp::Remove);
    h.wait_started("server", 2).await;

    assert_eq!(
        h.reporter
            .count(|r| matches!(r, Report::Removed { path } if path.ends_with("db.go"))),
        1
    );
    assert_eq!(h.watcher.removed(), vec![PathBuf::from("/proj/internal/db.go")]);
    h.shutdown().await;
}

#[tokio::test]
async fn new_directory_is_indexed_without_a_restart() {
    let fs = go_project();
    let h = Harness::start(
        server_activity(),
        fs.clone(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    fs.add_file("/proj/pkg/util.go", "package pkg");
    h.watcher.send("/proj/pkg", FsOp::Create);
    with_timeout(wait_until(|| {
        h.watcher
            .registered()
            .contains(&PathBuf::from("/proj/pkg/util.go"))
    }))
    .await;

    assert!(h.reporter.changed().is_empty());
    assert_eq!(h.executor.count_started("server"), 1);

    let (index, _, _, _) = h.shutdown().await;
    assert!(index.folders.contains(&PathBuf::from("/proj/pkg")));
    assert!(index.files.contains(&PathBuf::from("/proj/pkg/util.go")));
}

#[tokio::test]
async fn watcher_errors_are_reported_and_the_loop_keeps_going() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    h.watcher.send_error("inotify queue overflow");
    with_timeout(wait_until(|| {
        h.reporter
            .count(|r| matches!(r, Report::WatchError { .. }))
            == 1
    }))
    .await;

    h.watcher.send("/proj/main.go", FsOp::Write);
    h.wait_started("server", 2).await;
    h.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancels_the_pipeline_then_runs_the_after_phase() {
    let h = Harness::start(
        server_activity(),
        go_project(),
        FakeExecutor::new().blocking("server"),
    );
    h.wait_started("server", 1).await;

    let (index, executor, reporter, watcher) = h.shutdown().await;

    assert_eq!(
        executor.finished_cmds(),
        vec!["go mod download", "go build", "server", "cleanup"]
    );
    assert_eq!(reporter.phases(), vec![Phase::Before, Phase::Main, Phase::After]);
    assert!(watcher.is_closed());
    assert_eq!(
        index.files,
        [
            PathBuf::from("/proj/internal/db.go"),
            PathBuf::from("/proj/main.go"),
        ]
        .into_iter()
        .collect()
    );
}

#[tokio::test]
async fn before_phase_runs_while_indexing() {
    let activity = ActivityBuilder::new("docs")
        .watch_ext(&["md"])
        .before(cmd("prepare"))
        .task(cmd("render"))
        .build();
    let h = Harness::start(activity, go_project(), FakeExecutor::new());
    h.wait_started("render", 1).await;

    assert_eq!(h.executor.started_cmds(), vec!["prepare", "render"]);
    let (index, _, _, _) = h.shutdown().await;
    assert_eq!(
        index.files,
        [PathBuf::from("/proj/README.md")].into_iter().collect()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn interrupted_process_is_reaped_before_the_next_run_starts() {
    use watchrun::exec::ProcessExecutor;

    init_tracing();
    let reporter = RecordingReporter::new();
    let (watcher, streams, handle) = FakeWatcher::new();
    let (stop, stopped) = oneshot::channel::<()>();
    let executor = Arc::new(
        ProcessExecutor::new(Arc::new(reporter.clone())).with_grace(Duration::from_secs(1)),
    );
    let activity = ActivityBuilder::new("sleeper")
        .watch_ext(&["go"])
        .task(cmd("sleep 5"))
        .build();

    let scheduler = ActivityScheduler::new(
        activity,
        Box::new(watcher),
        streams,
        executor,
        Arc::new(reporter.clone()),
    )
    .with_fs(Arc::new(go_project()))
    .with_base_dir("/proj");
    let run = tokio::spawn(scheduler.run(async move {
        let _ = stopped.await;
    }));

    let started = |r: &RecordingReporter| r.count(|r| matches!(r, Report::CommandStarted { .. }));
    with_timeout(wait_until(|| started(&reporter) == 1)).await;
    handle.send("/proj/main.go", FsOp::Write);
    with_timeout(wait_until(|| started(&reporter) == 2)).await;

    let lifecycle: Vec<&'static str> = reporter
        .reports()
        .iter()
        .filter_map(|r| match r {
            Report::CommandStarted { .. } => Some("started"),
            Report::CommandFinished { .. } => Some("finished"),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle, vec!["started", "finished", "started"]);

    let _ = stop.send(());
    with_timeout(run).await.unwrap().unwrap();
}
