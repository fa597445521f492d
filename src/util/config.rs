//! Configuration file support for ilweave.
//!
//! ilweave reads two configuration files:
//! - Global: `<user config dir>/ilweave/config.toml` - User-wide defaults
//! - Project: `ilweave.toml` in the project root - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resolver::search::DEFAULT_EXTENSIONS;
use crate::util::fs;
use crate::weaver::{LogSink, MarkerMatcher, WeaveOptions};

/// Name of the project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "ilweave.toml";

/// ilweave configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Weaving settings
    pub weave: WeaveConfig,

    /// Module and search path settings
    pub paths: PathsConfig,
}

/// Weaving-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Full name of the marker attribute (default `LogAttribute`)
    pub marker: Option<String>,

    /// Module the marker attribute must be declared in
    pub marker_module: Option<String>,

    /// Module declaring the logging sink (default `UnityEngine`)
    pub sink_module: Option<String>,

    /// Type declaring the logging sink (default `UnityEngine.Debug`)
    pub sink_type: Option<String>,

    /// Name of the logging sink (default `Log`)
    pub sink_method: Option<String>,

    /// Weave without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

/// Path-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Glob patterns selecting modules to weave, relative to the project root
    pub include: Vec<String>,

    /// Extra directories searched for referenced modules
    pub search_dirs: Vec<PathBuf>,

    /// Directory holding the host's runtime modules
    pub runtime_dir: Option<PathBuf>,

    /// Module file extensions (default `dll`, `exe`)
    pub module_extensions: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Weave settings
        if other.weave.marker.is_some() {
            self.weave.marker = other.weave.marker;
        }
        if other.weave.marker_module.is_some() {
            self.weave.marker_module = other.weave.marker_module;
        }
        if other.weave.sink_module.is_some() {
            self.weave.sink_module = other.weave.sink_module;
        }
        if other.weave.sink_type.is_some() {
            self.weave.sink_type = other.weave.sink_type;
        }
        if other.weave.sink_method.is_some() {
            self.weave.sink_method = other.weave.sink_method;
        }
        if other.weave.dry_run {
            self.weave.dry_run = true;
        }

        // Path settings
        if !other.paths.include.is_empty() {
            self.paths.include = other.paths.include;
        }
        // Search directories accumulate
        self.paths.search_dirs.extend(other.paths.search_dirs);
        if other.paths.runtime_dir.is_some() {
            self.paths.runtime_dir = other.paths.runtime_dir;
        }
        if !other.paths.module_extensions.is_empty() {
            self.paths.module_extensions = other.paths.module_extensions;
        }
    }

    /// Make relative paths absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for dir in &mut self.paths.search_dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(dir) = &mut self.paths.runtime_dir {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Module file extensions, falling back to the defaults.
    pub fn module_extensions(&self) -> Vec<String> {
        if self.paths.module_extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            self.paths
                .module_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect()
        }
    }

    /// Weaver options described by this config.
    pub fn weave_options(&self) -> WeaveOptions {
        let mut marker = match &self.weave.marker {
            Some(name) => MarkerMatcher::new(name),
            None => MarkerMatcher::default(),
        };
        if let Some(module) = &self.weave.marker_module {
            marker = marker.declared_in(module);
        }

        let defaults = LogSink::default();
        let sink = LogSink {
            module: self.weave.sink_module.clone().unwrap_or(defaults.module),
            type_name: self.weave.sink_type.clone().unwrap_or(defaults.type_name),
            method_name: self.weave.sink_method.clone().unwrap_or(defaults.method_name),
        };

        WeaveOptions { marker, sink }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (ilweave.toml)
/// 2. Global config (<user config dir>/ilweave/config.toml)
/// 3. Defaults
///
/// Relative paths in the project config are taken relative to the project root.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        let mut project = Config::load_or_default(project_path);
        if let Some(root) = project_path.parent() {
            project.resolve_paths(root);
        }
        config.merge(project);
    }

    config
}

/// Get the global ilweave config path.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ilweave").map(|d| d.config_dir().join("config.toml"))
}

/// Get the project config path.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.weave.marker.is_none());
        assert!(!config.weave.dry_run);
        assert_eq!(config.module_extensions(), vec!["dll", "exe"]);

        let options = config.weave_options();
        assert_eq!(options.marker.full_name, "LogAttribute");
        assert_eq!(options.sink, LogSink::default());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("ilweave.toml");

        std::fs::write(
            &config_path,
            r#"
[weave]
marker = "TraceAttribute"
marker_module = "Tracing"
sink_module = "Tracing"
sink_type = "Tracing.Trace"
sink_method = "Write"

[paths]
include = ["Library/ScriptAssemblies/*.dll"]
search_dirs = ["Plugins"]
runtime_dir = "/opt/unity/Data/Managed"
module_extensions = [".dll"]
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.weave.marker.as_deref(), Some("TraceAttribute"));
        assert_eq!(config.paths.include.len(), 1);
        assert_eq!(config.module_extensions(), vec!["dll"]);

        let options = config.weave_options();
        assert_eq!(options.marker.declaring_module.as_deref(), Some("Tracing"));
        assert_eq!(options.sink.type_name, "Tracing.Trace");
        assert_eq!(options.sink.method_name, "Write");
    }

    #[test]
    fn test_config_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("ilweave.toml");
        std::fs::write(&config_path, "[weave\nmarker = ").unwrap();

        assert!(Config::load(&config_path).is_err());
        assert!(Config::load_or_default(&config_path).weave.marker.is_none());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.weave.marker = Some("LogAttribute".to_string());
        base.weave.sink_module = Some("UnityEngine".to_string());
        base.paths.search_dirs = vec![PathBuf::from("/global")];

        let mut override_cfg = Config::default();
        override_cfg.weave.marker = Some("TraceAttribute".to_string());
        override_cfg.paths.search_dirs = vec![PathBuf::from("/project")];

        base.merge(override_cfg);

        assert_eq!(base.weave.marker.as_deref(), Some("TraceAttribute"));
        assert_eq!(base.weave.sink_module.as_deref(), Some("UnityEngine")); // Not overridden
        assert_eq!(
            base.paths.search_dirs,
            vec![PathBuf::from("/global"), PathBuf::from("/project")]
        );
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_dir = tmp.path().join("project");
        std::fs::create_dir_all(&project_dir).unwrap();
        let project_path = project_dir.join("ilweave.toml");

        std::fs::write(
            &global_path,
            r#"
[weave]
marker = "GlobalAttribute"
sink_method = "LogFormat"

[paths]
runtime_dir = "/opt/runtime"
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[weave]
marker = "LogAttribute"

[paths]
search_dirs = ["Plugins"]
"#,
        )
        .unwrap();

        let config = load_config(Some(&global_path), &project_path);

        assert_eq!(config.weave.marker.as_deref(), Some("LogAttribute"));
        assert_eq!(config.weave.sink_method.as_deref(), Some("LogFormat"));
        assert_eq!(config.paths.runtime_dir, Some(PathBuf::from("/opt/runtime")));
        assert_eq!(config.paths.search_dirs, vec![project_dir.join("Plugins")]);
    }

    #[test]
    fn test_load_config_missing_files() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(None, &tmp.path().join("ilweave.toml"));
        assert!(config.paths.include.is_empty());
    }
}
