//! Debug-symbol companion files.
//!
//! Two formats can accompany a module:
//! - `pdb`, stored next to the module with its extension replaced, keyed by
//!   type and method index
//! - `mdb`, stored at `<module path>.mdb`, keyed by method name and tied to
//!   the module name
//!
//! [`SymbolConfig::detect`] picks at most one input, preferring `pdb`. Output
//! is always `mdb`.

pub mod mdb;
pub mod pdb;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::bytes::DecodeError;
use crate::core::{MethodBody, Module, SequencePoint, SymbolData, SymbolFormat};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error reading a symbol file.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("failed to read symbol file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed symbol file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("symbol file {} belongs to module `{found}`, expected `{expected}`", path.display())]
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("symbol file {} describes unknown method `{method}`", path.display())]
    UnknownMethod { path: PathBuf, method: String },

    #[error("symbol file {} does not match the module: {message}", path.display())]
    Inconsistent { path: PathBuf, message: String },
}

impl SymbolError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let path = match self {
            SymbolError::Io { path, .. }
            | SymbolError::Malformed { path, .. }
            | SymbolError::Mismatch { path, .. }
            | SymbolError::UnknownMethod { path, .. }
            | SymbolError::Inconsistent { path, .. } => path,
        };
        let mut diag = Diagnostic::error(self.to_string()).with_location(path);
        if let SymbolError::Io { source, .. } = self {
            diag = diag.with_context(source.to_string());
        }
        diag.with_suggestion("Delete the stale symbol file or rebuild the module")
            .with_suggestion(suggestions::REBUILD_MODULE)
    }
}

/// A symbol file to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSource {
    pub format: SymbolFormat,
    pub path: PathBuf,
}

/// Which symbol file to read and where to write symbols back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolConfig {
    pub read: Option<SymbolSource>,
    /// Destination of the canonical symbol file
    pub write: Option<PathBuf>,
}

impl SymbolConfig {
    /// Neither read nor write symbols.
    pub fn none() -> Self {
        SymbolConfig::default()
    }

    /// Detect the companion symbol file of a module.
    ///
    /// Only checks for existence; the files are not opened.
    pub fn detect(module_path: &Path) -> Self {
        let pdb = pdb_path(module_path);
        let mdb = canonical_path(module_path);

        let read = if pdb.is_file() {
            Some(SymbolSource {
                format: SymbolFormat::Pdb,
                path: pdb,
            })
        } else if mdb.is_file() {
            Some(SymbolSource {
                format: SymbolFormat::Mdb,
                path: mdb.clone(),
            })
        } else {
            None
        };

        match read {
            Some(source) => {
                tracing::debug!(
                    "found {} symbols for {}",
                    source.format,
                    module_path.display()
                );
                SymbolConfig {
                    read: Some(source),
                    write: Some(mdb),
                }
            }
            None => SymbolConfig::none(),
        }
    }
}

/// `<module path without extension>.pdb`
pub fn pdb_path(module_path: &Path) -> PathBuf {
    module_path.with_extension(SymbolFormat::Pdb.extension())
}

/// `<module path>.mdb`, the canonical output location.
pub fn canonical_path(module_path: &Path) -> PathBuf {
    let mut path = module_path.as_os_str().to_os_string();
    path.push(".");
    path.push(SymbolFormat::Mdb.extension());
    PathBuf::from(path)
}

/// Read a symbol file and attach its sequence points to `module`.
pub fn read_symbols(source: &SymbolSource, module: &mut Module) -> Result<(), SymbolError> {
    let bytes = std::fs::read(&source.path).map_err(|e| SymbolError::Io {
        path: source.path.clone(),
        source: e,
    })?;

    let malformed = |e: DecodeError| SymbolError::Malformed {
        path: source.path.clone(),
        source: e,
    };

    let table = match source.format {
        SymbolFormat::Pdb => pdb::decode(&bytes).map_err(malformed)?,
        SymbolFormat::Mdb => mdb::decode(&bytes).map_err(malformed)?,
    };

    if let Some(found) = &table.module_name {
        if *found != module.name {
            return Err(SymbolError::Mismatch {
                path: source.path.clone(),
                expected: module.name.clone(),
                found: found.clone(),
            });
        }
    }

    table.apply(source.format, module, &source.path)?;
    tracing::debug!(
        "loaded {} symbols from {}",
        source.format,
        source.path.display()
    );
    Ok(())
}

/// Encode the canonical symbol file for `module`.
pub fn encode_canonical(module: &Module) -> Vec<u8> {
    mdb::encode(module)
}

/// How a symbol file names a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodKey {
    Index { type_index: u32, method_index: u32 },
    Name(String),
}

/// A sequence point addressed by instruction position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawPoint {
    pub offset: u32,
    pub document: u32,
    pub line: u32,
    pub column: u16,
}

/// Decoded contents of a symbol file, before it is attached to a module.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    pub module_name: Option<String>,
    pub documents: Vec<String>,
    pub methods: Vec<(MethodKey, Vec<RawPoint>)>,
}

impl SymbolTable {
    fn apply(
        self,
        format: SymbolFormat,
        module: &mut Module,
        path: &Path,
    ) -> Result<(), SymbolError> {
        let inconsistent = |message: String| SymbolError::Inconsistent {
            path: path.to_path_buf(),
            message,
        };
        let by_key: HashMap<String, (usize, usize)> = method_keys(module)
            .into_iter()
            .map(|(index, key)| (key, index))
            .collect();

        for (key, points) in self.methods {
            let label = match &key {
                MethodKey::Index {
                    type_index,
                    method_index,
                } => format!("def[{}:{}]", type_index, method_index),
                MethodKey::Name(name) => name.clone(),
            };
            let unknown = || SymbolError::UnknownMethod {
                path: path.to_path_buf(),
                method: label.clone(),
            };

            let (type_index, method_index) = match &key {
                MethodKey::Index {
                    type_index,
                    method_index,
                } => (*type_index as usize, *method_index as usize),
                MethodKey::Name(name) => by_key.get(name).copied().ok_or_else(unknown)?,
            };

            let body = module
                .types
                .get_mut(type_index)
                .and_then(|ty| ty.methods.get_mut(method_index))
                .and_then(|m| m.body.as_mut())
                .ok_or_else(unknown)?;

            for point in points {
                let instruction = body
                    .ids()
                    .get(point.offset as usize)
                    .copied()
                    .ok_or_else(|| {
                        inconsistent(format!(
                            "{}: offset {} is outside the method body",
                            label, point.offset
                        ))
                    })?;
                if point.document as usize >= self.documents.len() {
                    return Err(inconsistent(format!(
                        "{}: document #{} does not exist",
                        label, point.document
                    )));
                }
                body.sequence_points.push(SequencePoint {
                    instruction,
                    document: point.document,
                    line: point.line,
                    column: point.column,
                });
            }
        }

        module.symbols = Some(SymbolData {
            source_format: format,
            documents: self.documents,
        });
        Ok(())
    }
}

/// Key used by name-keyed formats: `Type::Method(params)`.
pub(crate) fn method_key(type_name: &str, method_name: &str, param_count: u8) -> String {
    format!("{}::{}({})", type_name, method_name, param_count)
}

/// Name keys of every method of `module` with its (type, method) index.
///
/// Overloads sharing a key get `#1`, `#2`, ... appended in declaration order,
/// the first one keeps the plain key.
pub(crate) fn method_keys(module: &Module) -> Vec<((usize, usize), String)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut keys = Vec::new();
    for (t, ty) in module.types.iter().enumerate() {
        for (m, method) in ty.methods.iter().enumerate() {
            let base = method_key(&ty.full_name, &method.name, method.sig.param_count);
            let ordinal = seen.entry(base.clone()).or_insert(0);
            let key = match *ordinal {
                0 => base,
                n => format!("{}#{}", base, n),
            };
            *ordinal += 1;
            keys.push(((t, m), key));
        }
    }
    keys
}

/// Sequence points of a body by position.
///
/// Points whose instruction is no longer part of the body are dropped.
pub(crate) fn body_points(body: &MethodBody) -> Vec<RawPoint> {
    let positions = body.positions();
    let mut points: Vec<RawPoint> = body
        .sequence_points
        .iter()
        .filter_map(|sp| {
            let Some(&offset) = positions.get(&sp.instruction) else {
                tracing::debug!("dropping sequence point for removed instruction");
                return None;
            };
            Some(RawPoint {
                offset: offset as u32,
                document: sp.document,
                line: sp.line,
                column: sp.column,
            })
        })
        .collect();
    points.sort_by_key(|p| p.offset);
    points
}
