//! Resolution error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::ReadError;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error resolving an external module or one of its methods.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("could not find module `{name}`")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to load module `{name}` from {}", path.display())]
    Load {
        name: String,
        path: PathBuf,
        #[source]
        source: Box<ReadError>,
    },

    #[error("module `{module}` has no method `{member}`")]
    MemberNotFound {
        module: String,
        member: String,
        reason: String,
    },
}

impl ResolutionError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolutionError::NotFound { name, searched } => {
                let mut diag = Diagnostic::error(format!("could not find module `{}`", name));

                if searched.is_empty() {
                    diag = diag.with_context("no search directories were configured");
                } else {
                    for dir in searched {
                        diag = diag.with_context(format!("searched {}", dir.display()));
                    }
                }

                diag.with_suggestion(suggestions::MISSING_SEARCH_DIR)
                    .with_suggestion(suggestions::MISSING_RUNTIME_DIR)
            }

            ResolutionError::Load { name, path, source } => {
                Diagnostic::error(format!("failed to load module `{}`", name))
                    .with_location(path)
                    .with_context(source.to_string())
                    .with_suggestion(suggestions::REBUILD_MODULE)
            }

            ResolutionError::MemberNotFound {
                module,
                member,
                reason,
            } => Diagnostic::error(format!("module `{}` has no method `{}`", module, member))
                .with_context(reason.clone())
                .with_suggestion(suggestions::CHECK_SINK),
        }
    }
}
