use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use watchrun::errors::{Result, WatchrunError};
use watchrun::exec::{CancelToken, CommandExecutor};
use watchrun::types::Command;

/// One leaf the fake executor was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cmd: String,
    pub epoch: u64,
}

/// A fake executor that:
/// - records which commands were started and which finished
/// - completes immediately, after a configured delay, or only once the
///   generation is retired
/// - tracks how many commands were in flight at once.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    blocking: HashSet<String>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    started: Mutex<Vec<Invocation>>,
    finished: Mutex<Vec<Invocation>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `cmd` runs until its generation is retired.
    pub fn blocking(mut self, cmd: &str) -> Self {
        self.blocking.insert(cmd.to_string());
        self
    }

    /// `cmd` takes `delay`, or less if cancelled.
    pub fn with_delay(mut self, cmd: &str, delay: Duration) -> Self {
        self.delays.insert(cmd.to_string(), delay);
        self
    }

    /// `cmd` fails as if it could not be spawned.
    pub fn failing(mut self, cmd: &str) -> Self {
        self.failing.insert(cmd.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn started(&self) -> Vec<Invocation> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_cmds(&self) -> Vec<String> {
        self.started().into_iter().map(|i| i.cmd).collect()
    }

    pub fn finished(&self) -> Vec<Invocation> {
        self.finished.lock().unwrap().clone()
    }

    pub fn finished_cmds(&self) -> Vec<String> {
        self.finished().into_iter().map(|i| i.cmd).collect()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of commands ever in flight at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn count_started(&self, cmd: &str) -> usize {
        self.started.lock().unwrap().iter().filter(|i| i.cmd == cmd).count()
    }
}

impl CommandExecutor for FakeExecutor {
    fn exec<'a>(
        &'a self,
        command: &'a Command,
        token: &'a CancelToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let invocation = Invocation {
                cmd: command.cmd.clone(),
                epoch: token.epoch(),
            };
            if self.failing.contains(&command.cmd) {
                self.started.lock().unwrap().push(invocation);
                return Err(WatchrunError::Spawn {
                    cmd: command.cmd.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "fake failure"),
                });
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(invocation.clone());

            if self.blocking.contains(&command.cmd) {
                token.retired().await;
            } else if let Some(delay) = self.delays.get(&command.cmd) {
                tokio::select! {
                    _ = tokio::time::sleep(*delay) => {}
                    _ = token.retired() => {}
                }
            } else {
                tokio::task::yield_now().await;
            }

            self.finished.lock().unwrap().push(invocation);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
