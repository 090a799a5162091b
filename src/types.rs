use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Deserialize;

/// What an activity watches: a set of extensions and a list of root
/// paths or globs.
///
/// Extensions are stored without a leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSpec {
    pub extensions: BTreeSet<String>,
    pub paths: Vec<PathBuf>,
}

impl WatchSpec {
    pub fn new<E, P>(extensions: E, paths: P) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: Into<PathBuf>,
    {
        Self {
            extensions: normalize_extensions(extensions),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// What an activity leaves out, even if it is inside a watched path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSpec {
    pub hidden: bool,
    pub extensions: BTreeSet<String>,
    pub paths: Vec<PathBuf>,
}

impl IgnoreSpec {
    pub fn new<E, P>(hidden: bool, extensions: E, paths: P) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: Into<PathBuf>,
    {
        Self {
            hidden,
            extensions: normalize_extensions(extensions),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// `"go"`, `".go"` and `" .go "` all name the same extension.
pub fn normalize_extensions<E>(extensions: E) -> BTreeSet<String>
where
    E: IntoIterator,
    E::Item: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// A single external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub cmd: String,

    /// Working directory; the process working directory when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Mark this command's output for the persistent log.
    #[serde(default)]
    pub log: bool,
}

impl Command {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            dir: None,
            log: false,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn logged(mut self) -> Self {
        self.log = true;
        self
    }

    /// Short identifying label: the words before the first `-` option.
    ///
    /// `"go build -o bin/api ./cmd"` is labelled `"go build"`.
    pub fn label(&self) -> String {
        command_label(&self.cmd)
    }
}

pub fn command_label(cmd: &str) -> String {
    cmd.split_whitespace()
        .take_while(|word| !word.starts_with('-'))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One node of a task tree.
///
/// In config files the variants are told apart by their keys:
/// `{ cmd = ... }`, `{ sequence = [...] }` or `{ parallel = [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TaskNode {
    Command(Command),
    Series {
        sequence: Vec<TaskNode>,
    },
    Parallel {
        parallel: Vec<TaskNode>,
    },
}

impl TaskNode {
    pub fn command(cmd: impl Into<String>) -> Self {
        TaskNode::Command(Command::new(cmd))
    }

    pub fn series(children: impl IntoIterator<Item = TaskNode>) -> Self {
        TaskNode::Series {
            sequence: children.into_iter().collect(),
        }
    }

    pub fn parallel(children: impl IntoIterator<Item = TaskNode>) -> Self {
        TaskNode::Parallel {
            parallel: children.into_iter().collect(),
        }
    }

    /// Number of `Command` leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            TaskNode::Command(_) => 1,
            TaskNode::Series { sequence: children } | TaskNode::Parallel { parallel: children } => {
                children.iter().map(TaskNode::leaf_count).sum()
            }
        }
    }
}

impl From<Command> for TaskNode {
    fn from(cmd: Command) -> Self {
        TaskNode::Command(cmd)
    }
}

/// One watch-and-run unit: its rules plus its three task phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub name: String,
    pub watch: WatchSpec,
    pub ignore: IgnoreSpec,
    /// Runs once, alongside initial indexing.
    pub before: Vec<TaskNode>,
    /// The pipeline restarted on every relevant change.
    pub tasks: Vec<TaskNode>,
    /// Runs once at shutdown.
    pub after: Vec<TaskNode>,
}

/// Which notification backend a watcher should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    /// Native OS notifications.
    Native,
    /// Periodic polling, for filesystems where native events are unreliable.
    Poll { interval: std::time::Duration },
}

impl Default for WatchBackend {
    fn default() -> Self {
        WatchBackend::Native
    }
}
