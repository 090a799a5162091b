// src/watch/filter.rs

//! Deciding whether a path is in scope for an activity.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::fs::FileSystem;
use crate::report::{Report, Reporter};
use crate::types::{IgnoreSpec, WatchSpec};
use crate::watch::glob::{expand, has_glob_meta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Outcome of [`PathFilter::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Rejected,
    /// Accepted; the entry kind is `None` when the path does not exist
    /// (e.g. it was just removed).
    Accepted(Option<EntryKind>),
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Validation::Accepted(Some(EntryKind::Dir)))
    }
}

/// A configured watch or ignore path, resolved to absolute form.
#[derive(Debug, Clone)]
struct PathRule {
    resolved: PathBuf,
    glob: bool,
}

/// Glob expansions kept for the length of one indexing pass.
///
/// A failed expansion is cached too, so it is reported once per pass.
#[derive(Debug, Default)]
pub struct ExpansionCache {
    entries: HashMap<PathBuf, Option<Arc<[PathBuf]>>>,
}

impl ExpansionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Watch/ignore rules of one activity.
///
/// Rules are applied in a fixed order and the first failing rule rejects:
/// empty path, hidden name, extension lists, absolute resolution, ignore
/// paths, watch paths. Path rules are plain substring matches against the
/// resolved path. Glob rules are expanded on every [`validate`] call so
/// entries created after start-up are covered; a walk uses
/// [`validate_cached`] to expand each rule once.
///
/// [`validate`]: PathFilter::validate
/// [`validate_cached`]: PathFilter::validate_cached
#[derive(Clone)]
pub struct PathFilter {
    hidden: bool,
    watch_ext: BTreeSet<String>,
    ignore_ext: BTreeSet<String>,
    watch_paths: Vec<PathRule>,
    ignore_paths: Vec<PathRule>,
    base: PathBuf,
    fs: Arc<dyn FileSystem>,
    reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("hidden", &self.hidden)
            .field("watch_ext", &self.watch_ext)
            .field("ignore_ext", &self.ignore_ext)
            .field("watch_paths", &self.watch_paths)
            .field("ignore_paths", &self.ignore_paths)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl PathFilter {
    /// `base` is the directory relative paths are resolved against
    /// (normally the process working directory).
    pub fn new(
        watch: &WatchSpec,
        ignore: &IgnoreSpec,
        base: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let base = clean(&base.into());
        let rules = |paths: &[PathBuf]| -> Vec<PathRule> {
            paths
                .iter()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| PathRule {
                    resolved: clean(&base.join(p)),
                    glob: has_glob_meta(&p.to_string_lossy()),
                })
                .collect()
        };

        Self {
            hidden: ignore.hidden,
            watch_ext: watch.extensions.clone(),
            ignore_ext: ignore.extensions.clone(),
            watch_paths: rules(&watch.paths),
            ignore_paths: rules(&ignore.paths),
            base,
            fs,
            reporter,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute, lexically cleaned form of `path`.
    pub fn resolve(&self, path: &Path) -> std::io::Result<PathBuf> {
        let joined = self.base.join(path);
        std::path::absolute(&joined).map(|p| clean(&p))
    }

    pub fn validate(&self, path: &Path) -> Validation {
        self.validate_with(path, None)
    }

    /// Same decision as [`validate`](Self::validate), reusing expansions
    /// already in `cache`.
    pub fn validate_cached(&self, path: &Path, cache: &mut ExpansionCache) -> Validation {
        self.validate_with(path, Some(cache))
    }

    fn validate_with(&self, path: &Path, mut cache: Option<&mut ExpansionCache>) -> Validation {
        if path.as_os_str().is_empty() {
            return Validation::Rejected;
        }

        if self.hidden && is_hidden(path) {
            return Validation::Rejected;
        }

        if let Some(ext) = extension_of(path) {
            if self.ignore_ext.contains(&ext) {
                return Validation::Rejected;
            }
            if !self.watch_ext.is_empty() && !self.watch_ext.contains(&ext) {
                return Validation::Rejected;
            }
        }

        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.reporter.report(Report::ResolveError {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
                return Validation::Rejected;
            }
        };
        let resolved_str = resolved.to_string_lossy();

        for rule in &self.ignore_paths {
            if resolved_str.contains(rule.resolved.to_string_lossy().as_ref()) {
                return Validation::Rejected;
            }
            if rule.glob {
                let Some(expansions) = self.expansions(rule, cache.as_deref_mut()) else {
                    return Validation::Rejected;
                };
                if expansions
                    .iter()
                    .any(|p| resolved_str.contains(p.to_string_lossy().as_ref()))
                {
                    return Validation::Rejected;
                }
            }
        }

        if !self.watch_paths.is_empty() {
            let mut matched = false;
            for rule in &self.watch_paths {
                if resolved_str.contains(rule.resolved.to_string_lossy().as_ref()) {
                    matched = true;
                    break;
                }
                if rule.glob {
                    let Some(expansions) = self.expansions(rule, cache.as_deref_mut()) else {
                        return Validation::Rejected;
                    };
                    // Ancestors of a match stay in scope so indexing can reach it.
                    if expansions.iter().any(|p| {
                        resolved_str.contains(p.to_string_lossy().as_ref()) || p.starts_with(&resolved)
                    }) {
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                return Validation::Rejected;
            }
        }

        Validation::Accepted(self.entry_kind(&resolved))
    }

    fn expansions(
        &self,
        rule: &PathRule,
        cache: Option<&mut ExpansionCache>,
    ) -> Option<Arc<[PathBuf]>> {
        match cache {
            Some(cache) => cache
                .entries
                .entry(rule.resolved.clone())
                .or_insert_with(|| self.expand_rule(rule))
                .clone(),
            None => self.expand_rule(rule),
        }
    }

    fn expand_rule(&self, rule: &PathRule) -> Option<Arc<[PathBuf]>> {
        match expand(self.fs.as_ref(), &rule.resolved) {
            Ok(expansions) => Some(Arc::from(expansions)),
            Err(err) => {
                self.reporter.report(Report::ResolveError {
                    path: rule.resolved.clone(),
                    message: format!("{err:#}"),
                });
                None
            }
        }
    }

    fn entry_kind(&self, resolved: &Path) -> Option<EntryKind> {
        if self.fs.is_dir(resolved) {
            Some(EntryKind::Dir)
        } else if self.fs.is_file(resolved) {
            Some(EntryKind::File)
        } else {
            None
        }
    }
}

/// Extension without the dot, if the path has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Resolve `.` and `..` components without touching the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
