// tests/indexer_walk.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use watchrun::fs::mock::MockFileSystem;
use watchrun::fs::{FileSystem, RealFileSystem};
use watchrun::report::Report;
use watchrun::types::Activity;
use watchrun::watch::{Indexer, PathFilter};
use watchrun_test_utils::{ActivityBuilder, FakeWatcher, FakeWatcherHandle, RecordingReporter, cmd};

fn indexer(
    activity: &Activity,
    base: &Path,
    fs: Arc<dyn FileSystem>,
) -> (Indexer, FakeWatcherHandle, RecordingReporter) {
    let reporter = RecordingReporter::new();
    let filter = PathFilter::new(
        &activity.watch,
        &activity.ignore,
        base,
        Arc::clone(&fs),
        Arc::new(reporter.clone()),
    );
    let (watcher, _streams, handle) = FakeWatcher::new();
    let indexer = Indexer::new(filter, fs, Box::new(watcher), Arc::new(reporter.clone()));
    (indexer, handle, reporter)
}

/// A small Go project on disk. The prefix avoids tempfile's hidden `.tmp` default.
fn go_project() -> tempfile::TempDir {
    let dir = tempfile::Builder::new().prefix("watchrun").tempdir().unwrap();
    let root = dir.path();
    for sub in ["src/handlers", ".git", "vendor/lib"] {
        fs::create_dir_all(root.join(sub)).unwrap();
    }
    fs::write(root.join("src/main.go"), "package main").unwrap();
    fs::write(root.join("src/handlers/user.go"), "package handlers").unwrap();
    fs::write(root.join("README.md"), "# project").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    fs::write(root.join("vendor/lib/lib.go"), "package lib").unwrap();
    dir
}

fn go_activity() -> Activity {
    ActivityBuilder::new("api")
        .watch_ext(&["go"])
        .ignore_hidden()
        .ignore_path("vendor")
        .task(cmd("go build"))
        .build()
}

fn set(paths: &[PathBuf]) -> std::collections::BTreeSet<PathBuf> {
    paths.iter().cloned().collect()
}

#[test]
fn indexes_the_working_directory_when_no_roots_are_given() {
    let dir = go_project();
    let root = dir.path().canonicalize().unwrap();
    let (mut indexer, handle, reporter) = indexer(&go_activity(), &root, Arc::new(RealFileSystem));

    indexer.index_roots(&[]);
    let index = indexer.index();

    assert_eq!(
        index.files,
        set(&[root.join("src/handlers/user.go"), root.join("src/main.go")])
    );
    assert_eq!(
        index.folders,
        set(&[root.clone(), root.join("src"), root.join("src/handlers")])
    );
    assert_eq!(handle.registered().len(), index.len());
    assert!(!handle.registered().iter().any(|p| p.starts_with(root.join("vendor"))));
    assert!(!handle.registered().iter().any(|p| p.starts_with(root.join(".git"))));
    assert_eq!(reporter.count(|r| matches!(r, Report::IndexingError { .. })), 0);
}

#[test]
fn indexing_twice_gives_the_same_index() {
    let dir = go_project();
    let root = dir.path().canonicalize().unwrap();
    let (mut indexer, _, _) = indexer(&go_activity(), &root, Arc::new(RealFileSystem));

    indexer.index_roots(&[]);
    let first = indexer.index().clone();
    indexer.index_roots(&[]);

    assert_eq!(indexer.index(), &first);
}

#[test]
fn only_configured_roots_are_walked() {
    let dir = go_project();
    let root = dir.path().canonicalize().unwrap();
    let activity = ActivityBuilder::new("handlers")
        .watch_ext(&["go"])
        .watch_path("src/handlers")
        .watch_path("does/not/exist")
        .task(cmd("go test"))
        .build();
    let (mut indexer, _, reporter) = indexer(&activity, &root, Arc::new(RealFileSystem));

    indexer.index_roots(&activity.watch.paths);

    assert_eq!(indexer.index().files, set(&[root.join("src/handlers/user.go")]));
    assert_eq!(indexer.index().folders, set(&[root.join("src/handlers")]));
    assert_eq!(reporter.count(|r| matches!(r, Report::IndexingError { .. })), 0);
}

#[test]
fn glob_roots_are_expanded() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/cmd/api/main.go", "");
    fs.add_file("/work/cmd/worker/main.go", "");
    fs.add_file("/work/cmd/worker/util.go", "");
    let activity = ActivityBuilder::new("mains")
        .watch_path("cmd/*/main.go")
        .task(cmd("go build"))
        .build();
    let (mut indexer, _, _) = indexer(&activity, Path::new("/work"), Arc::new(fs));

    indexer.index_roots(&activity.watch.paths);

    assert_eq!(
        indexer.index().files,
        set(&[
            PathBuf::from("/work/cmd/api/main.go"),
            PathBuf::from("/work/cmd/worker/main.go"),
        ])
    );
    assert!(indexer.index().folders.is_empty());
}

#[test]
fn unreadable_directories_are_reported_and_skipped() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/ok/a.go", "");
    fs.add_file("/work/locked/b.go", "");
    fs.make_unreadable("/work/locked");
    let activity = ActivityBuilder::new("a").task(cmd("true")).build();
    let (mut indexer, _, reporter) = indexer(&activity, Path::new("/work"), Arc::new(fs));

    indexer.index_roots(&[]);

    assert_eq!(indexer.index().files, set(&[PathBuf::from("/work/ok/a.go")]));
    assert!(indexer.index().folders.contains(Path::new("/work/locked")));
    let errors: Vec<PathBuf> = reporter
        .reports()
        .into_iter()
        .filter_map(|r| match r {
            Report::IndexingError { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![PathBuf::from("/work/locked")]);
}

#[test]
fn nothing_outside_the_working_directory_is_walked() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/main.go", "");
    fs.add_file("/elsewhere/secret.go", "");
    let activity = ActivityBuilder::new("a")
        .watch_path("/elsewhere")
        .task(cmd("true"))
        .build();
    let (mut indexer, handle, _) = indexer(&activity, Path::new("/work"), Arc::new(fs));

    indexer.index_roots(&activity.watch.paths);

    assert!(indexer.index().is_empty());
    assert!(handle.registered().is_empty());
}

#[test]
fn close_stops_the_watcher_and_returns_the_index() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/main.go", "");
    let activity = ActivityBuilder::new("a").task(cmd("true")).build();
    let (mut indexer, handle, _) = indexer(&activity, Path::new("/work"), Arc::new(fs));

    indexer.index_roots(&[]);
    let index = indexer.close();

    assert!(handle.is_closed());
    assert_eq!(index.files, set(&[PathBuf::from("/work/main.go")]));
}

#[test]
fn entries_are_classified_by_extension_and_directories_are_still_walked() {
    let fs = MockFileSystem::new();
    fs.add_file("/work/Makefile", "build:");
    fs.add_file("/work/conf.d/app.conf", "");
    let activity = ActivityBuilder::new("a").task(cmd("make")).build();
    let (mut indexer, handle, _) = indexer(&activity, Path::new("/work"), Arc::new(fs));

    indexer.index_roots(&[]);

    assert_eq!(
        indexer.index().files,
        set(&[
            PathBuf::from("/work/conf.d"),
            PathBuf::from("/work/conf.d/app.conf"),
        ])
    );
    assert_eq!(
        indexer.index().folders,
        set(&[PathBuf::from("/work"), PathBuf::from("/work/Makefile")])
    );
    assert!(handle.registered().contains(&PathBuf::from("/work/conf.d/app.conf")));
}

#[test]
fn glob_rules_are_expanded_once_per_indexing_pass() {
    let fs = MockFileSystem::new();
    for i in 0..10 {
        fs.add_file(format!("/work/internal/a/f{i}.go"), "");
        fs.add_file(format!("/work/internal/b/g{i}.go"), "");
    }
    let activity = ActivityBuilder::new("internal")
        .watch_ext(&["go"])
        .watch_path("internal/**")
        .task(cmd("go test ./internal/..."))
        .build();
    let (mut indexer, _, reporter) = indexer(&activity, Path::new("/work"), Arc::new(fs.clone()));

    indexer.index_roots(&activity.watch.paths);

    assert_eq!(indexer.index().files.len(), 20);
    assert_eq!(reporter.count(|r| matches!(r, Report::IndexingError { .. })), 0);
    // Root expansion, one cached rule expansion and the walk itself each read
    // the three directories at most once.
    let reads = fs.read_dir_calls();
    assert!(reads <= 9, "{reads} read_dir calls");
}
