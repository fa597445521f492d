//! Test utilities for ilweave unit tests.
//!
//! Provides sample modules, an in-memory resolver and helpers for laying
//! out a project on disk.

pub mod fixtures;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::Module;

pub use fixtures::*;

/// A temporary project with an `ilweave.toml` and a module directory.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    /// Create a project whose config contains `config`.
    pub fn new(config: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(dir.path().join("ilweave.toml"), config).expect("failed to write config");
        std::fs::create_dir_all(dir.path().join("Library")).expect("failed to create Library");
        TestProject { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the project's modules.
    pub fn library(&self) -> PathBuf {
        self.root().join("Library")
    }

    /// Write a module into the library directory.
    pub fn add_module(&self, module: &Module) -> PathBuf {
        write_module(&self.library(), module)
    }
}

/// Assertion helpers for testing.
pub mod assertions {
    /// Assert that an error message contains a substring.
    pub fn assert_error_contains<T: std::fmt::Debug, E: std::fmt::Display>(
        result: Result<T, E>,
        substring: &str,
    ) {
        match result {
            Ok(v) => panic!("expected Err containing '{}', got Ok: {:?}", substring, v),
            Err(e) => {
                let msg = e.to_string();
                assert!(
                    msg.contains(substring),
                    "error '{}' does not contain '{}'",
                    msg,
                    substring
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_layout() {
        let project = TestProject::new("[weave]\n");
        let path = project.add_module(&sink_module());

        assert!(project.root().join("ilweave.toml").is_file());
        assert_eq!(path, project.library().join("UnityEngine.dll"));
        assert!(path.is_file());
    }

    #[test]
    fn test_map_resolver_counts_lookups() {
        let mut resolver = MapResolver::with_sink();
        assert!(crate::resolver::Resolve::resolve(&mut resolver, "UnityEngine").is_ok());
        assertions::assert_error_contains(
            crate::resolver::Resolve::resolve(&mut resolver, "Missing").map(|_| ()),
            "could not find module `Missing`",
        );
        assert_eq!(resolver.lookups(), 2);
    }
}
