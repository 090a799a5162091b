// src/watch/glob.rs

//! Expanding wildcard paths into the entries that currently exist.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::GlobBuilder;
use tracing::debug;

use crate::fs::FileSystem;

/// True if the string contains any glob metacharacter.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Expand an absolute wildcard path such as `/work/cmd/*/main.go`.
///
/// The literal leading components form the base directory; the rest is
/// compiled with `globset` (with `*` not crossing `/`) and matched against
/// paths relative to the base. A path without wildcards expands to itself
/// if it exists. Unreadable directories below the base are skipped.
pub fn expand(fs: &dyn FileSystem, pattern: &Path) -> Result<Vec<PathBuf>> {
    let (base, rest) = split_pattern(pattern);
    if rest.is_empty() {
        return Ok(if fs.exists(&base) { vec![base] } else { Vec::new() });
    }

    let rest_pattern = rest.join("/");
    let matcher = GlobBuilder::new(&rest_pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {}", pattern.display()))?
        .compile_matcher();

    // `**` can match any depth; otherwise matches sit exactly `rest.len()` levels down.
    let max_depth = if rest.iter().any(|c| c.contains("**")) {
        usize::MAX
    } else {
        rest.len()
    };

    let mut matches = Vec::new();
    if !fs.is_dir(&base) {
        return Ok(matches);
    }

    let mut stack = vec![(base.clone(), 0usize)];
    while let Some((dir, depth)) = stack.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable directory during glob expansion");
                continue;
            }
        };
        for entry in entries {
            let Ok(rel) = entry.strip_prefix(&base) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if matcher.is_match(&rel) {
                matches.push(entry.clone());
            }
            if depth + 1 < max_depth && fs.is_dir(&entry) {
                stack.push((entry, depth + 1));
            }
        }
    }

    matches.sort();
    Ok(matches)
}

/// Split into the literal base directory and the remaining pattern components.
fn split_pattern(pattern: &Path) -> (PathBuf, Vec<String>) {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();
    for component in pattern.components() {
        let part = component.as_os_str().to_string_lossy();
        let is_normal = matches!(component, Component::Normal(_));
        if rest.is_empty() && !(is_normal && has_glob_meta(&part)) {
            base.push(component);
        } else {
            rest.push(part.into_owned());
        }
    }
    (base, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn project() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("/work/cmd/api/main.go", "");
        fs.add_file("/work/cmd/worker/main.go", "");
        fs.add_file("/work/cmd/worker/README.md", "");
        fs.add_file("/work/internal/db/db.go", "");
        fs.add_file("/work/internal/db/sql/schema.go", "");
        fs
    }

    #[test]
    fn splits_literal_base_from_pattern() {
        let (base, rest) = split_pattern(Path::new("/work/cmd/*/main.go"));
        assert_eq!(base, PathBuf::from("/work/cmd"));
        assert_eq!(rest, vec!["*".to_string(), "main.go".to_string()]);
    }

    #[test]
    fn star_does_not_cross_directories() {
        let fs = project();
        let found = expand(&fs, Path::new("/work/cmd/*/main.go")).unwrap();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/work/cmd/api/main.go"),
                PathBuf::from("/work/cmd/worker/main.go"),
            ]
        );

        let shallow = expand(&fs, Path::new("/work/*.go")).unwrap();
        assert!(shallow.is_empty());
    }

    #[test]
    fn double_star_reaches_any_depth() {
        let fs = project();
        let found = expand(&fs, Path::new("/work/internal/**/*.go")).unwrap();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/work/internal/db/db.go"),
                PathBuf::from("/work/internal/db/sql/schema.go"),
            ]
        );
    }

    #[test]
    fn literal_path_expands_to_itself_only_if_present() {
        let fs = project();
        assert_eq!(
            expand(&fs, Path::new("/work/cmd")).unwrap(),
            vec![PathBuf::from("/work/cmd")]
        );
        assert!(expand(&fs, Path::new("/work/missing")).unwrap().is_empty());
    }

    #[test]
    fn malformed_pattern_is_an_error() {
        let fs = project();
        assert!(expand(&fs, Path::new("/work/[unclosed")).is_err());
    }
}
