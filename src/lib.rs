// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod report;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, Settings};
use crate::engine::ActivityScheduler;
use crate::exec::{Generation, ProcessExecutor};
use crate::fs::RealFileSystem;
use crate::report::{Reporter, TracingReporter};
use crate::types::{Activity, TaskNode, WatchBackend};
use crate::watch::{Index, NotifyWatcher};

/// Name of a finished activity and what its scheduler returned.
type ActivityOutcome = (String, errors::Result<Index>);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - one watcher + scheduler per selected activity
/// - the process executor
/// - Ctrl-C handling (a second Ctrl-C aborts without waiting)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let selected = select_activities(&cfg, &args.activities)?;

    if args.dry_run {
        print_dry_run(&cfg.settings, &selected);
        return Ok(());
    }

    let backend = if args.legacy || cfg.settings.legacy {
        WatchBackend::Poll {
            interval: cfg.settings.interval,
        }
    } else {
        WatchBackend::Native
    };

    // Every activity observes the same shutdown token.
    let shutdown = Generation::new();
    let mut activities = JoinSet::new();

    for activity in selected {
        let name = activity.name.clone();
        let scheduler = match build_scheduler(activity, &cfg.settings, backend) {
            Ok(scheduler) => scheduler,
            Err(err) => {
                error!(activity = %name, error = %err, "failed to start activity");
                continue;
            }
        };
        let token = shutdown.token();
        activities.spawn(async move {
            let result = scheduler.run(async move { token.retired().await }).await;
            (name, result)
        });
    }

    if activities.is_empty() {
        bail!("no activity could be started");
    }

    supervise(activities, shutdown, listen_for_interrupts()).await
}

/// Forward every Ctrl-C into a channel until the receiver goes away.
fn listen_for_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            if tx.send(()).is_err() {
                return;
            }
        }
    });
    rx
}

/// Wait for every activity to finish.
///
/// The first interrupt retires `shutdown` so activities stop gracefully.
/// A second one aborts whatever is still running and returns an error.
async fn supervise(
    mut activities: JoinSet<ActivityOutcome>,
    shutdown: Generation,
    mut interrupts: mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    let mut interrupted = false;

    loop {
        tokio::select! {
            Some(()) = interrupts.recv() => {
                if interrupted {
                    warn!(running = activities.len(), "second interrupt, aborting activities");
                    activities.abort_all();
                    while activities.join_next().await.is_some() {}
                    bail!("aborted by a second interrupt");
                }
                interrupted = true;
                info!("interrupt received, stopping activities (press Ctrl+C again to force)");
                shutdown.retire();
            }
            joined = activities.join_next() => match joined {
                None => break,
                Some(Ok((name, Ok(index)))) => info!(
                    activity = %name,
                    files = index.files.len(),
                    folders = index.folders.len(),
                    "activity finished"
                ),
                Some(Ok((name, Err(err)))) => {
                    error!(activity = %name, error = %err, "activity failed");
                }
                Some(Err(err)) => error!(error = %err, "activity task panicked"),
            },
        }
    }

    Ok(())
}

fn build_scheduler(
    activity: Activity,
    settings: &Settings,
    backend: WatchBackend,
) -> Result<ActivityScheduler> {
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter::new(activity.name.clone()));
    let executor =
        Arc::new(ProcessExecutor::new(Arc::clone(&reporter)).with_grace(settings.grace));
    let (watcher, streams) = NotifyWatcher::new(backend, Arc::new(RealFileSystem))
        .context("creating file watcher")?;

    Ok(ActivityScheduler::new(
        activity,
        Box::new(watcher),
        streams,
        executor,
        reporter,
    ))
}

/// Activities named on the command line, or all of them.
fn select_activities(cfg: &ConfigFile, names: &[String]) -> Result<Vec<Activity>> {
    if names.is_empty() {
        return Ok(cfg.activities.clone());
    }

    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match cfg.activity(name) {
            Some(activity) => {
                if selected.iter().any(|a: &Activity| a.name == activity.name) {
                    warn!(activity = %name, "activity selected twice");
                    continue;
                }
                selected.push(activity.clone());
            }
            None => bail!("no activity named '{name}' in config"),
        }
    }
    Ok(selected)
}

fn print_dry_run(settings: &Settings, activities: &[Activity]) {
    println!("watchrun dry-run");
    println!("  settings.legacy = {}", settings.legacy);
    println!("  settings.interval = {:?}", settings.interval);
    println!("  settings.grace = {:?}", settings.grace);
    println!();

    println!("activities ({}):", activities.len());
    for activity in activities {
        println!("  - {}", activity.name);
        if !activity.watch.extensions.is_empty() {
            println!("      watch.ext: {:?}", activity.watch.extensions);
        }
        if !activity.watch.paths.is_empty() {
            println!("      watch.paths: {:?}", activity.watch.paths);
        }
        if activity.ignore.hidden {
            println!("      ignore.hidden: true");
        }
        if !activity.ignore.extensions.is_empty() {
            println!("      ignore.ext: {:?}", activity.ignore.extensions);
        }
        if !activity.ignore.paths.is_empty() {
            println!("      ignore.paths: {:?}", activity.ignore.paths);
        }
        print_phase("before", &activity.before);
        print_phase("tasks", &activity.tasks);
        print_phase("after", &activity.after);
    }

    debug!("dry-run complete (no execution)");
}

fn print_phase(title: &str, nodes: &[TaskNode]) {
    if nodes.is_empty() {
        return;
    }
    println!("      {title}:");
    for node in nodes {
        print_node(node, 4);
    }
}

fn print_node(node: &TaskNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        TaskNode::Command(cmd) => match &cmd.dir {
            Some(dir) => println!("{indent}- {} (in {})", cmd.cmd, dir.display()),
            None => println!("{indent}- {}", cmd.cmd),
        },
        TaskNode::Series { sequence } => {
            println!("{indent}sequence:");
            for child in sequence {
                print_node(child, depth + 1);
            }
        }
        TaskNode::Parallel { parallel } => {
            println!("{indent}parallel:");
            for child in parallel {
                print_node(child, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stop_on_retire(activities: &mut JoinSet<ActivityOutcome>, shutdown: &Generation) {
        let token = shutdown.token();
        activities.spawn(async move {
            token.retired().await;
            ("api".to_string(), Ok(Index::default()))
        });
    }

    #[tokio::test]
    async fn first_interrupt_stops_activities_gracefully() {
        let shutdown = Generation::new();
        let mut activities = JoinSet::new();
        stop_on_retire(&mut activities, &shutdown);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(()).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            supervise(activities, shutdown, rx),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn second_interrupt_aborts_activities_that_do_not_stop() {
        let shutdown = Generation::new();
        let mut activities = JoinSet::new();
        activities.spawn(async {
            std::future::pending::<()>().await;
            ("stuck".to_string(), Ok(Index::default()))
        });
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(()).unwrap();
        tx.send(()).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            supervise(activities, shutdown, rx),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("second interrupt"), "{err}");
    }

    #[tokio::test]
    async fn activities_finishing_on_their_own_need_no_interrupt() {
        let shutdown = Generation::new();
        let mut activities = JoinSet::new();
        activities.spawn(async { ("once".to_string(), Ok(Index::default())) });
        let (_tx, rx) = mpsc::unbounded_channel();

        supervise(activities, shutdown, rx).await.unwrap();
    }
}
