// src/exec/tree.rs

//! Recursive interpreter for task trees.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::exec::backend::CommandExecutor;
use crate::exec::cancel::CancelToken;
use crate::report::{Report, Reporter};
use crate::types::{Command, TaskNode};

/// Runs task trees against a [`CommandExecutor`].
///
/// Cloning is cheap; parallel children each get their own clone.
#[derive(Clone)]
pub struct TaskRunner {
    executor: Arc<dyn CommandExecutor>,
    reporter: Arc<dyn Reporter>,
}

impl TaskRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, reporter: Arc<dyn Reporter>) -> Self {
        Self { executor, reporter }
    }

    /// Run `nodes` in order, returning once every node has completed or been
    /// cancelled through `token`.
    pub async fn run(&self, token: &CancelToken, nodes: &[TaskNode]) {
        for node in nodes {
            self.run_node(token, node).await;
        }
    }

    fn run_node<'a>(
        &'a self,
        token: &'a CancelToken,
        node: &'a TaskNode,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            match node {
                TaskNode::Command(command) => self.run_command(token, command).await,
                TaskNode::Series { sequence } => self.run(token, sequence).await,
                TaskNode::Parallel { parallel } => self.run_parallel(token, parallel).await,
            }
        })
    }

    async fn run_command(&self, token: &CancelToken, command: &Command) {
        if token.is_retired() {
            trace!(cmd = %command.cmd, epoch = token.epoch(), "generation retired; skipping command");
            return;
        }
        if command.cmd.trim().is_empty() {
            return;
        }
        if let Err(err) = self.executor.exec(command, token).await {
            self.reporter.report(Report::CommandError {
                label: command.label(),
                message: err.to_string(),
            });
        }
    }

    async fn run_parallel(&self, token: &CancelToken, children: &[TaskNode]) {
        let mut group = JoinSet::new();
        for child in children {
            let runner = self.clone();
            let token = token.clone();
            let child = child.clone();
            group.spawn(async move { runner.run_node(&token, &child).await });
        }

        debug!(children = children.len(), "waiting for parallel group");
        while let Some(joined) = group.join_next().await {
            if let Err(err) = joined {
                self.reporter.report(Report::CommandError {
                    label: "parallel".to_string(),
                    message: format!("task panicked: {err}"),
                });
            }
        }
    }
}
