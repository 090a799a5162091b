// src/watch/indexer.rs

//! Walking watch roots and registering what is in scope.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::report::{Report, Reporter};
use crate::watch::filter::{extension_of, EntryKind, ExpansionCache, PathFilter, Validation};
use crate::watch::glob::{expand, has_glob_meta};
use crate::watch::watcher::FileWatcher;

/// Discovered paths of an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    pub files: BTreeSet<PathBuf>,
    pub folders: BTreeSet<PathBuf>,
}

impl Index {
    pub fn len(&self) -> usize {
        self.files.len() + self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

/// State shared by the walks of one indexing pass.
#[derive(Debug, Default)]
struct Pass {
    expansions: ExpansionCache,
    visited: HashSet<PathBuf>,
}

/// Owns the watcher and the index, and keeps both in step.
pub struct Indexer {
    filter: PathFilter,
    fs: Arc<dyn FileSystem>,
    watcher: Box<dyn FileWatcher>,
    reporter: Arc<dyn Reporter>,
    /// Canonical working directory; nothing outside it is walked.
    bound: PathBuf,
    index: Index,
}

impl Indexer {
    pub fn new(
        filter: PathFilter,
        fs: Arc<dyn FileSystem>,
        watcher: Box<dyn FileWatcher>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let base = filter.base().to_path_buf();
        let bound = fs.canonicalize(&base).unwrap_or(base);
        Self {
            filter,
            fs,
            watcher,
            reporter,
            bound,
            index: Index::default(),
        }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn watcher_mut(&mut self) -> &mut dyn FileWatcher {
        self.watcher.as_mut()
    }

    /// Index every configured watch root.
    ///
    /// Roots are resolved against the working directory, glob-expanded and
    /// existence-checked. With no roots configured the working directory
    /// itself is indexed.
    pub fn index_roots(&mut self, roots: &[PathBuf]) {
        let mut pass = Pass::default();
        if roots.is_empty() {
            let base = self.filter.base().to_path_buf();
            self.walk_in(&base, &mut pass);
            return;
        }

        for root in roots {
            let resolved = match self.filter.resolve(root) {
                Ok(resolved) => resolved,
                Err(err) => {
                    self.reporter.report(Report::IndexingError {
                        path: root.clone(),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let targets = if has_glob_meta(&resolved.to_string_lossy()) {
                match expand(self.fs.as_ref(), &resolved) {
                    Ok(targets) => targets,
                    Err(err) => {
                        self.reporter.report(Report::IndexingError {
                            path: root.clone(),
                            message: format!("{err:#}"),
                        });
                        continue;
                    }
                }
            } else {
                vec![resolved]
            };

            for target in targets {
                if self.fs.exists(&target) {
                    self.walk_in(&target, &mut pass);
                } else {
                    debug!(root = %target.display(), "watch root does not exist; skipping");
                }
            }
        }

        debug!(
            files = self.index.files.len(),
            folders = self.index.folders.len(),
            "indexing finished"
        );
    }

    /// Depth-first walk from `root`. Rejected directories are pruned.
    ///
    /// Entries with an extension are recorded as files, everything else as
    /// a folder. Directories are descended into either way.
    pub fn walk(&mut self, root: &Path) {
        self.walk_in(root, &mut Pass::default());
    }

    fn walk_in(&mut self, root: &Path, pass: &mut Pass) {
        let mut stack = vec![root.to_path_buf()];

        while let Some(path) = stack.pop() {
            if !pass.visited.insert(path.clone()) {
                continue;
            }
            let canonical = self.fs.canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !canonical.starts_with(&self.bound) {
                trace!(path = %path.display(), "outside working directory; skipping");
                continue;
            }

            let kind = match self.filter.validate_cached(&path, &mut pass.expansions) {
                Validation::Rejected => continue,
                Validation::Accepted(kind) => kind,
            };

            let normalized = self.watcher.walk(&path, true);
            if extension_of(&normalized).is_some() {
                self.index.files.insert(normalized);
            } else {
                self.index.folders.insert(normalized);
            }

            if kind != Some(EntryKind::Dir) {
                continue;
            }
            match self.fs.read_dir(&path) {
                Ok(mut children) => {
                    // Reverse so the stack pops children in directory order.
                    children.reverse();
                    stack.extend(children);
                }
                Err(err) => self.reporter.report(Report::IndexingError {
                    path: path.clone(),
                    message: format!("{err:#}"),
                }),
            }
        }
    }

    /// Close the watcher and hand back a snapshot of the index.
    pub fn close(&mut self) -> Index {
        self.watcher.close();
        self.index.clone()
    }
}
