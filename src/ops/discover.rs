//! Candidate module discovery and search directory collection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::resolver::SearchDirectories;
use crate::util::fs::{glob_files, has_extension, normalize_path, walk_files_with_extensions};

/// Environment variable naming the host's runtime module directory.
pub const RUNTIME_DIR_ENV: &str = "ILWEAVE_RUNTIME_DIR";

/// Expand user-supplied paths into module files.
///
/// Files are taken as given. Directories are walked recursively for files
/// with one of `extensions`. The result keeps first-seen order without
/// duplicates.
pub fn discover_modules(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for path in paths {
        let found = if path.is_dir() {
            walk_files_with_extensions(path, extensions)
        } else if path.is_file() {
            if !has_extension(path, extensions) {
                tracing::debug!(
                    "{} has an unusual extension, weaving it anyway",
                    path.display()
                );
            }
            vec![path.clone()]
        } else {
            bail!("no such file or directory: {}", path.display());
        };

        for module in found {
            if seen.insert(normalize_path(&module)) {
                modules.push(module);
            }
        }
    }

    tracing::debug!("discovered {} candidate modules", modules.len());
    Ok(modules)
}

/// Expand `include` globs relative to the project root.
pub fn expand_includes(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let modules = glob_files(root, patterns)?;
    if modules.is_empty() {
        tracing::warn!(
            "include patterns matched no modules under {}",
            root.display()
        );
    }
    Ok(modules)
}

/// Build the resolver's search directories.
///
/// In order: the directory of every candidate, the extra directories, then
/// the runtime directory. Missing extra directories are dropped with a
/// warning.
pub fn collect_search_dirs(
    candidates: &[PathBuf],
    extra: &[PathBuf],
    runtime_dir: Option<&Path>,
) -> SearchDirectories {
    let mut dirs = SearchDirectories::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            dirs.add(parent);
        }
    }

    for dir in extra.iter().map(PathBuf::as_path).chain(runtime_dir) {
        if dir.is_dir() {
            dirs.add(dir);
        } else {
            tracing::warn!("search directory {} does not exist", dir.display());
        }
    }

    tracing::debug!("{} search directories", dirs.len());
    dirs
}
