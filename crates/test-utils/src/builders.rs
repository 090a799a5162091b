#![allow(dead_code)]

use std::path::PathBuf;

use watchrun::types::{Activity, IgnoreSpec, TaskNode, WatchSpec};

/// Leaf node for `cmd`.
pub fn cmd(cmd: &str) -> TaskNode {
    TaskNode::command(cmd)
}

pub fn seq(children: impl IntoIterator<Item = TaskNode>) -> TaskNode {
    TaskNode::series(children)
}

pub fn par(children: impl IntoIterator<Item = TaskNode>) -> TaskNode {
    TaskNode::parallel(children)
}

/// Builder for `Activity` to simplify test setup.
pub struct ActivityBuilder {
    activity: Activity,
}

impl ActivityBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            activity: Activity {
                name: name.to_string(),
                ..Activity::default()
            },
        }
    }

    pub fn watch_ext(mut self, exts: &[&str]) -> Self {
        let mut all: Vec<String> = self.activity.watch.extensions.iter().cloned().collect();
        all.extend(exts.iter().map(|e| e.to_string()));
        self.activity.watch = WatchSpec::new(all, self.activity.watch.paths.clone());
        self
    }

    pub fn watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.activity.watch.paths.push(path.into());
        self
    }

    pub fn ignore_hidden(mut self) -> Self {
        self.activity.ignore.hidden = true;
        self
    }

    pub fn ignore_ext(mut self, exts: &[&str]) -> Self {
        let mut all: Vec<String> = self.activity.ignore.extensions.iter().cloned().collect();
        all.extend(exts.iter().map(|e| e.to_string()));
        self.activity.ignore = IgnoreSpec::new(
            self.activity.ignore.hidden,
            all,
            self.activity.ignore.paths.clone(),
        );
        self
    }

    pub fn ignore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.activity.ignore.paths.push(path.into());
        self
    }

    pub fn before(mut self, node: TaskNode) -> Self {
        self.activity.before.push(node);
        self
    }

    pub fn task(mut self, node: TaskNode) -> Self {
        self.activity.tasks.push(node);
        self
    }

    pub fn after(mut self, node: TaskNode) -> Self {
        self.activity.after.push(node);
        self
    }

    pub fn build(self) -> Activity {
        self.activity
    }
}
