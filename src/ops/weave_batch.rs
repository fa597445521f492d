//! Weaving a batch of modules.
//!
//! Every candidate is processed on its own: detect symbols, read, weave and
//! write it back only if something changed. A failing module is reported and
//! the batch moves on to the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::codec::{self, ReadError, ReadMode, ReaderParameters, WriteError};
use crate::resolver::{Resolve, ResolutionError, SearchDirectories, SearchPathResolver};
use crate::symbols::SymbolConfig;
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::fs::{is_inside, normalize_path, relative_path};
use crate::util::shell::{Progress, Shell, Status};
use crate::weaver::{self, WeaveOptions};

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub weave: WeaveOptions,

    /// Read and weave, but never write
    pub dry_run: bool,

    /// How thoroughly each module's references are checked on read
    pub read_mode: ReadMode,

    /// Look for companion symbol files
    pub symbols: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            weave: WeaveOptions::default(),
            dry_run: false,
            read_mode: ReadMode::Full,
            symbols: true,
        }
    }
}

/// Why one module could not be processed.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("could not resolve the logging sink: {0}")]
    Weave(#[from] ResolutionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl ModuleError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ModuleError::Read(e) => e.to_diagnostic(),
            ModuleError::Weave(e) => {
                let inner = e.to_diagnostic();
                let mut diag = Diagnostic::error(self.to_string())
                    .with_context("the module was left unchanged");
                for ctx in inner.context {
                    diag = diag.with_context(ctx);
                }
                for suggestion in inner.suggestions {
                    diag = diag.with_suggestion(suggestion);
                }
                diag.with_suggestion(suggestions::CHECK_SINK)
            }
            ModuleError::Write(e) => e.to_diagnostic(),
        }
    }
}

/// What happened to one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ModuleStatus {
    /// Methods were woven; `written` is false on a dry run
    Woven { methods: Vec<String>, written: bool },
    /// Nothing was marked
    Unchanged,
    Failed { error: String },
}

/// Per-module result of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ModuleStatus,

    /// Marked methods without a body
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,

    #[serde(skip)]
    pub diagnostic: Option<Diagnostic>,
}

impl ModuleOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ModuleStatus::Failed { .. })
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub modules: Vec<ModuleOutcome>,
}

impl BatchReport {
    /// Modules that had at least one method woven.
    pub fn woven(&self) -> usize {
        self.count(|s| matches!(s, ModuleStatus::Woven { .. }))
    }

    /// Modules written back to disk.
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, ModuleStatus::Woven { written: true, .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, ModuleStatus::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ModuleStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Total number of woven methods.
    pub fn methods(&self) -> usize {
        self.modules
            .iter()
            .map(|m| match &m.status {
                ModuleStatus::Woven { methods, .. } => methods.len(),
                _ => 0,
            })
            .sum()
    }

    fn count(&self, f: impl Fn(&ModuleStatus) -> bool) -> usize {
        self.modules.iter().filter(|m| f(&m.status)).count()
    }
}

/// Weave `candidates`, resolving references through a search-path resolver
/// over `dirs`.
pub fn weave_modules(
    candidates: &[PathBuf],
    dirs: SearchDirectories,
    extensions: Vec<String>,
    options: &BatchOptions,
    shell: &Arc<Shell>,
) -> BatchReport {
    let mut resolver = SearchPathResolver::new(dirs).with_extensions(extensions);
    let report = run_batch(candidates, &mut resolver, options, shell);
    tracing::debug!("resolver loaded {} modules", resolver.cached());
    report
}

/// Weave every candidate with `resolver`.
pub fn run_batch(
    candidates: &[PathBuf],
    resolver: &mut dyn Resolve,
    options: &BatchOptions,
    shell: &Arc<Shell>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut progress = shell.progress(candidates.len() as u64, "Weaving");

    let cwd = std::env::current_dir().ok().map(|d| normalize_path(&d));

    for path in candidates {
        let shown = shown_path(cwd.as_deref(), path);
        progress.suspend(|| shell.status(Status::Weaving, shown.display()));

        let outcome = match process_module(path, &shown, resolver, options, shell, &progress) {
            Ok((status, skipped)) => ModuleOutcome {
                path: path.clone(),
                status,
                skipped,
                diagnostic: None,
            },
            Err(e) => {
                tracing::debug!("failed to weave {}: {}", path.display(), e);
                let diagnostic = e.to_diagnostic().with_location(path);
                progress.suspend(|| {
                    shell.status(Status::Failed, shown.display());
                    shell.diagnostic(&diagnostic);
                });
                ModuleOutcome {
                    path: path.clone(),
                    status: ModuleStatus::Failed {
                        error: e.to_string(),
                    },
                    skipped: Vec::new(),
                    diagnostic: Some(diagnostic),
                }
            }
        };

        if let Ok(event) = serde_json::to_value(&outcome) {
            shell.json_event(&serde_json::json!({ "reason": "module", "module": event }));
        }
        report.modules.push(outcome);
        progress.inc(1);
    }

    progress.finish();
    report
}

/// `path` relative to the working directory when it lies inside it.
fn shown_path(cwd: Option<&Path>, path: &Path) -> PathBuf {
    match cwd {
        Some(cwd) if is_inside(path, cwd) => relative_path(cwd, path),
        _ => path.to_path_buf(),
    }
}

fn process_module(
    path: &Path,
    shown: &Path,
    resolver: &mut dyn Resolve,
    options: &BatchOptions,
    shell: &Shell,
    progress: &Progress,
) -> Result<(ModuleStatus, Vec<String>), ModuleError> {
    tracing::debug!("Processing {}", path.display());

    let symbols = if options.symbols {
        SymbolConfig::detect(path)
    } else {
        SymbolConfig::none()
    };
    let params = ReaderParameters {
        mode: options.read_mode,
        symbols: symbols.clone(),
    };

    let mut module = codec::read_module(path, resolver, &params)?;
    let report = weaver::weave(&mut module, resolver, &options.weave)?;

    let skipped: Vec<String> = report.skipped.iter().map(|m| m.qualified_name()).collect();
    for name in &skipped {
        progress.suspend(|| shell.status(Status::Skipped, format!("{} has no body", name)));
    }

    if !report.mutated() {
        tracing::debug!("{} didn't need to be processed", path.display());
        if shell.is_verbose() {
            shell.status(Status::Unchanged, shown.display());
        }
        return Ok((ModuleStatus::Unchanged, skipped));
    }

    let methods: Vec<String> = report.woven.iter().map(|m| m.qualified_name()).collect();

    if options.dry_run {
        tracing::info!(
            "would write {} woven methods to {}",
            methods.len(),
            path.display()
        );
        return Ok((
            ModuleStatus::Woven {
                methods,
                written: false,
            },
            skipped,
        ));
    }

    tracing::debug!("Writing to {}", path.display());
    progress.suspend(|| {
        shell.status(
            Status::Writing,
            format!("{} ({} methods)", shown.display(), methods.len()),
        )
    });
    codec::write_module(&module, path, &symbols)?;

    Ok((
        ModuleStatus::Woven {
            methods,
            written: true,
        },
        skipped,
    ))
}
