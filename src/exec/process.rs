// src/exec/process.rs

//! Real process executor.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, WatchrunError};
use crate::exec::backend::CommandExecutor;
use crate::exec::cancel::CancelToken;
use crate::report::{Report, Reporter};
use crate::types::Command;

/// How long an interrupted process gets to exit before it is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// How long output readers may keep going once the child has been reaped.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// Runs commands as child processes.
///
/// Each child leads its own process group. Output lines go to the reporter as
/// they arrive. When the token is retired mid-flight the whole group gets an
/// interrupt, then `grace` to exit, then a kill. `exec` always waits for the
/// child to be reaped before returning, and kills anything it left behind in
/// its group.
pub struct ProcessExecutor {
    reporter: Arc<dyn Reporter>,
    grace: Duration,
}

impl ProcessExecutor {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    async fn run(&self, command: &Command, token: &CancelToken) -> Result<()> {
        let label = command.label();
        let mut words = command.cmd.split_whitespace();
        let program = words.next().ok_or(WatchrunError::EmptyCommand)?;

        let mut process = ProcessCommand::new(program);
        process
            .args(words)
            .current_dir(working_dir(command)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let mut child = process.spawn().map_err(|source| WatchrunError::Spawn {
            cmd: command.cmd.clone(),
            source,
        })?;

        let started = Instant::now();
        self.reporter.report(Report::CommandStarted {
            label: label.clone(),
        });
        info!(cmd = %command.cmd, pid = ?child.id(), "process started");

        let mut group = ProcessGroup(child.id());
        let readers = self.spawn_readers(&mut child, &label, command.log);

        let status = tokio::select! {
            status = child.wait() => status.ok(),
            _ = token.retired() => {
                debug!(cmd = %command.cmd, epoch = token.epoch(), "generation retired; interrupting process");
                self.interrupt_and_wait(&mut child, &group).await
            }
        };

        // Never leave the child behind, whichever branch was taken.
        let status = match status {
            Some(status) => Some(status),
            None => force_kill(&mut child, &group).await,
        };
        // Background children may still hold the output pipes open.
        group.kill_remaining();

        drain_readers(readers, &command.cmd).await;

        self.reporter.report(Report::CommandFinished {
            label,
            elapsed: started.elapsed(),
            status,
        });
        Ok(())
    }

    /// Graceful interrupt, then a kill if the child outlives the grace period.
    async fn interrupt_and_wait(
        &self,
        child: &mut Child,
        group: &ProcessGroup,
    ) -> Option<ExitStatus> {
        if !group.interrupt() {
            return force_kill(child, group).await;
        }
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!(error = %err, "waiting for interrupted process failed");
                force_kill(child, group).await
            }
            Err(_) => {
                warn!(pid = ?child.id(), grace = ?self.grace, "process ignored interrupt; killing");
                force_kill(child, group).await
            }
        }
    }

    fn spawn_readers(&self, child: &mut Child, label: &str, log: bool) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(stream_lines(
                stdout,
                Arc::clone(&self.reporter),
                label.to_string(),
                log,
                false,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(stream_lines(
                stderr,
                Arc::clone(&self.reporter),
                label.to_string(),
                log,
                true,
            ));
        }
        readers
    }
}

impl CommandExecutor for ProcessExecutor {
    fn exec<'a>(
        &'a self,
        command: &'a Command,
        token: &'a CancelToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.run(command, token))
    }
}

fn working_dir(command: &Command) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(match &command.dir {
        Some(dir) if !dir.as_os_str().is_empty() => cwd.join(dir),
        _ => cwd,
    })
}

fn stream_lines<R>(
    stream: R,
    reporter: Arc<dyn Reporter>,
    label: String,
    log: bool,
    is_stderr: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => {
                    let label = label.clone();
                    reporter.report(if is_stderr {
                        Report::ErrorOutput { label, line, log }
                    } else {
                        Report::Output { label, line, log }
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(cmd = %label, error = %err, "stopped reading process output");
                    break;
                }
            }
        }
    })
}

/// Wait a bounded time for the output readers, then detach whatever is left.
async fn drain_readers(readers: Vec<JoinHandle<()>>, cmd: &str) {
    let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN;
    for mut reader in readers {
        match tokio::time::timeout_at(deadline, &mut reader).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(cmd, error = %err, "output reader task failed"),
            Err(_) => {
                debug!(cmd, "output still open after exit; dropping reader");
                reader.abort();
            }
        }
    }
}

/// Kill the child (if it is still running) and reap it.
async fn force_kill(child: &mut Child, group: &ProcessGroup) -> Option<ExitStatus> {
    match child.try_wait() {
        Ok(Some(status)) => return Some(status),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "cannot query process state"),
    }
    group.kill();
    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill process");
    }
    child.wait().await.ok()
}

/// Process group led by a spawned child, identified by the child's pid.
///
/// Dropping it kills whatever is still in the group, so aborting `exec`
/// mid-flight does not leave grandchildren running.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    /// Ask every process in the group to stop. Returns false when no
    /// graceful signal was sent.
    fn interrupt(&self) -> bool {
        self.0.is_some_and(|pgid| signal_group(pgid, GroupSignal::Interrupt))
    }

    fn kill(&self) {
        if let Some(pgid) = self.0 {
            signal_group(pgid, GroupSignal::Kill);
        }
    }

    /// Kill the stragglers once, then forget the group id.
    fn kill_remaining(&mut self) {
        if let Some(pgid) = self.0.take() {
            signal_group(pgid, GroupSignal::Kill);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill_remaining();
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Interrupt,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(pgid) else {
        return false;
    };
    let signal = match signal {
        GroupSignal::Interrupt => Signal::SIGINT,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) => true,
        // Everyone in the group is already gone.
        Err(Errno::ESRCH) => false,
        Err(err) => {
            debug!(pgid, ?signal, error = %err, "failed to signal process group");
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) -> bool {
    false
}
