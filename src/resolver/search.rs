//! Directory-based module lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec;
use crate::core::Module;
use crate::resolver::{Resolve, ResolutionError};
use crate::util::fs::normalize_path;

/// Module file extensions tried by default, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &["dll", "exe"];

/// An ordered set of directories without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDirectories {
    dirs: Vec<PathBuf>,
}

impl SearchDirectories {
    pub fn new() -> Self {
        SearchDirectories::default()
    }

    /// Append a directory unless it is already present.
    ///
    /// Returns whether the directory was added.
    pub fn add(&mut self, dir: impl AsRef<Path>) -> bool {
        let dir = normalize_path(dir.as_ref());
        if self.dirs.contains(&dir) {
            return false;
        }
        self.dirs.push(dir);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> + '_ {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }
}

impl<P: AsRef<Path>> FromIterator<P> for SearchDirectories {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut dirs = SearchDirectories::new();
        for dir in iter {
            dirs.add(dir);
        }
        dirs
    }
}

/// Resolves module names against a list of search directories.
///
/// Loaded modules are cached by name. Dependencies are read shallowly, so
/// their own references are never followed.
#[derive(Debug)]
pub struct SearchPathResolver {
    dirs: SearchDirectories,
    extensions: Vec<String>,
    cache: HashMap<String, Arc<Module>>,
}

impl SearchPathResolver {
    pub fn new(dirs: SearchDirectories) -> Self {
        SearchPathResolver {
            dirs,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache: HashMap::new(),
        }
    }

    /// Replace the module file extensions tried in each directory.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn dirs(&self) -> &SearchDirectories {
        &self.dirs
    }

    /// Number of modules loaded so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Locate the file of module `name`; the first directory wins.
    pub fn find_file(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        for dir in self.dirs.iter() {
            for ext in &self.extensions {
                let candidate = dir.join(format!("{}.{}", name, ext));
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(ResolutionError::NotFound {
            name: name.to_string(),
            searched: self.dirs.to_vec(),
        })
    }
}

impl Resolve for SearchPathResolver {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, ResolutionError> {
        if let Some(module) = self.cache.get(name) {
            return Ok(Arc::clone(module));
        }

        let path = self.find_file(name)?;
        tracing::debug!("resolving `{}` from {}", name, path.display());

        let module = codec::read_module_shallow(&path).map_err(|e| ResolutionError::Load {
            name: name.to_string(),
            path: path.clone(),
            source: Box::new(e),
        })?;

        if module.name != name {
            tracing::debug!(
                "{} declares module name `{}`, resolved as `{}`",
                path.display(),
                module.name,
                name
            );
        }

        let module = Arc::new(module);
        self.cache.insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }
}
