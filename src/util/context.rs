//! Global context for ilweave operations.
//!
//! Provides centralized access to the working directory, the project root,
//! configuration and output preferences.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{self, Config, PROJECT_CONFIG_FILE};

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Global configuration file, if the platform has a config dir
    global_config: Option<PathBuf>,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        GlobalContext {
            cwd,
            global_config: config::global_config_path(),
            verbose: false,
        }
    }

    /// Override the global configuration file.
    pub fn with_global_config(mut self, path: Option<PathBuf>) -> Self {
        self.global_config = path;
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the global configuration file path.
    pub fn global_config_path(&self) -> Option<&Path> {
        self.global_config.as_deref()
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Find the project root: the nearest directory at or above cwd that
    /// contains `ilweave.toml`.
    pub fn find_project_root(&self) -> Option<PathBuf> {
        self.cwd
            .ancestors()
            .find(|dir| dir.join(PROJECT_CONFIG_FILE).is_file())
            .map(Path::to_path_buf)
    }

    /// The project root, or cwd when there is no project config.
    pub fn project_root(&self) -> PathBuf {
        self.find_project_root().unwrap_or_else(|| self.cwd.clone())
    }

    /// Load the merged global and project configuration.
    pub fn load_config(&self) -> Config {
        let project = config::project_config_path(&self.project_root());
        tracing::debug!("loading config from {}", project.display());
        config::load_config(self.global_config.as_deref(), &project)
    }

    /// Resolve a user-supplied path against cwd.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(!ctx.is_verbose());
    }

    #[test]
    fn test_find_project_root_upward() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("ilweave.toml"), "").unwrap();
        let nested = tmp.path().join("Library").join("ScriptAssemblies");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested);
        assert_eq!(ctx.find_project_root(), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn test_project_root_defaults_to_cwd() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        assert_eq!(ctx.project_root(), tmp.path());
    }

    #[test]
    fn test_load_config_from_project() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("ilweave.toml"),
            "[weave]\nmarker = \"TraceAttribute\"\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).with_global_config(None);
        let config = ctx.load_config();
        assert_eq!(config.weave.marker.as_deref(), Some("TraceAttribute"));
    }

    #[test]
    fn test_resolve_path() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        assert_eq!(ctx.resolve_path(Path::new("Game.dll")), tmp.path().join("Game.dll"));
    }
}
