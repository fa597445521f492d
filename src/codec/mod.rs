//! Module files on disk.
//!
//! A module file is a 48-byte [`header::Header`] followed by the payload:
//! the module name, its module and member reference tables, and every type
//! with its methods and bodies. All integers are little-endian and strings
//! are length-prefixed UTF-8. Branch targets and handler boundaries are
//! stored as instruction positions and turned into [`InstrId`]s on read.
//!
//! [`InstrId`]: crate::core::InstrId

pub mod bytes;
pub mod decode;
pub mod encode;
pub mod header;

pub use bytes::DecodeError;
pub use decode::decode_module;
pub use encode::encode_module;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{BodyError, Module};
use crate::resolver::{MethodTarget, Resolve, ResolutionError};
use crate::symbols::{self, SymbolConfig, SymbolError};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::fs::StagedFile;

/// File magic.
pub const MAGIC: [u8; 4] = *b"ILWV";

/// Current format version.
pub const VERSION: u16 = 1;

/// Error reading a module.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed module {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("{} references `{reference}`, which cannot be resolved", path.display())]
    UnresolvedReference {
        path: PathBuf,
        reference: String,
        #[source]
        source: ResolutionError,
    },

    #[error(transparent)]
    Symbols(#[from] SymbolError),
}

impl ReadError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ReadError::Io { path, source } => Diagnostic::error(self.to_string())
                .with_location(path)
                .with_context(source.to_string()),
            ReadError::Malformed { path, .. } => Diagnostic::error(self.to_string())
                .with_location(path)
                .with_suggestion(suggestions::REBUILD_MODULE),
            ReadError::UnresolvedReference { source, .. } => {
                let inner = source.to_diagnostic();
                let mut diag = Diagnostic::error(self.to_string()).with_context(inner.message);
                for ctx in inner.context {
                    diag = diag.with_context(ctx);
                }
                for suggestion in inner.suggestions {
                    diag = diag.with_suggestion(suggestion);
                }
                diag
            }
            ReadError::Symbols(e) => e.to_diagnostic(),
        }
    }
}

/// Error writing a module.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("method `{method}` has an invalid body: {source}")]
    Invalid {
        method: String,
        #[source]
        source: BodyError,
    },
}

impl WriteError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            WriteError::Io { path, source } => Diagnostic::error(self.to_string())
                .with_location(path)
                .with_context(source.to_string())
                .with_suggestion(suggestions::CHECK_PERMISSIONS),
            WriteError::Invalid { .. } => Diagnostic::error(self.to_string())
                .with_context("the original file was left untouched")
                .with_suggestion(suggestions::VERBOSE),
        }
    }
}

/// How much of a module's surroundings a read verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Resolve every member reference through the resolver
    #[default]
    Full,
    /// Decode the module only
    Shallow,
}

/// Options for [`read_module`].
#[derive(Debug, Clone, Default)]
pub struct ReaderParameters {
    pub mode: ReadMode,
    pub symbols: SymbolConfig,
}

/// Read a module, verify its references and attach its symbols.
pub fn read_module(
    path: &Path,
    resolver: &mut dyn Resolve,
    params: &ReaderParameters,
) -> Result<Module, ReadError> {
    let mut module = read_module_shallow(path)?;

    if params.mode == ReadMode::Full {
        for member in &module.member_refs {
            let Some(target) = MethodTarget::from_member_ref(&module, member) else {
                continue;
            };
            resolver
                .resolve_method(&target)
                .map_err(|source| ReadError::UnresolvedReference {
                    path: path.to_path_buf(),
                    reference: format!("[{}]{}", target.module, target),
                    source,
                })?;
        }
    }

    if let Some(source) = &params.symbols.read {
        symbols::read_symbols(source, &mut module)?;
    }

    tracing::debug!(
        "read module `{}` ({} types) from {}",
        module.name,
        module.types.len(),
        path.display()
    );
    Ok(module)
}

/// Decode a module file without resolving anything or loading symbols.
pub fn read_module_shallow(path: &Path) -> Result<Module, ReadError> {
    let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_module(&bytes).map_err(|source| ReadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a module, and its canonical symbol file when configured.
///
/// Both files are fully encoded and staged next to their destinations before
/// either is replaced, so an encoding or staging failure leaves the originals
/// untouched.
pub fn write_module(
    module: &Module,
    path: &Path,
    symbol_config: &SymbolConfig,
) -> Result<(), WriteError> {
    let module_bytes = encode_module(module)?;
    let symbol_bytes = symbol_config
        .write
        .as_ref()
        .map(|dest| (dest, symbols::encode_canonical(module)));

    let staged_module = StagedFile::stage(path, &module_bytes).map_err(io_error(path))?;
    let staged_symbols = match &symbol_bytes {
        Some((dest, bytes)) => Some(StagedFile::stage(dest, bytes).map_err(io_error(dest))?),
        None => None,
    };

    staged_module.commit().map_err(io_error(path))?;
    if let Some(staged) = staged_symbols {
        let dest = staged.dest().to_path_buf();
        staged.commit().map_err(io_error(&dest))?;
    }

    tracing::debug!("wrote module `{}` to {}", module.name, path.display());
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError {
    let path = path.to_path_buf();
    move |source| WriteError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ExceptionHandler, HandlerKind, Instruction, MethodBody, MethodBuilder, MethodSig,
        MethodToken, ModuleBuilder, OpCode, Operand, SymbolFormat, TypeBuilder,
    };
    use crate::resolver::SearchPathResolver;
    use crate::symbols::SymbolSource;
    use crate::test_support::fixtures;
    use std::fs;
    use tempfile::TempDir;

    fn roundtrip(module: &Module) -> Module {
        decode_module(&encode_module(module).unwrap()).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let module = fixtures::game_module();
        let decoded = roundtrip(&module);

        assert_eq!(decoded.name, "Game");
        assert_eq!(decoded.module_refs, module.module_refs);
        assert_eq!(decoded.member_refs, module.member_refs);
        assert_eq!(decoded.types.len(), module.types.len());

        let (ty, method) = decoded.methods().next().unwrap();
        assert_eq!(ty.full_name, "Game.Player");
        assert_eq!(method.name, "Update");
        assert_eq!(method.attributes, module.types[0].methods[0].attributes);

        let original: Vec<_> = module.types[0].methods[0]
            .body
            .as_ref()
            .unwrap()
            .instructions()
            .cloned()
            .collect();
        let decoded_instrs: Vec<_> = method.body.as_ref().unwrap().instructions().cloned().collect();
        assert_eq!(decoded_instrs, original);
    }

    #[test]
    fn test_branches_and_handlers_roundtrip() {
        let mut body = MethodBody::new();
        let try_start = body.push(Instruction::ldc_i4(1));
        let end = body.push(Instruction::ret());
        body.insert_before(end, Instruction::branch(OpCode::BrFalse, end))
            .unwrap();
        let handler = body.insert_before(end, Instruction::simple(OpCode::EndFinally)).unwrap();
        body.handlers.push(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: Some(end),
            catch_type: None,
        });
        let switch = body
            .insert_before(
                try_start,
                Instruction::new(OpCode::Switch, Operand::Switch(vec![end, try_start])),
            )
            .unwrap();
        body.insert_before(switch, Instruction::ldc_i4(0)).unwrap();

        let module = ModuleBuilder::new("Flow")
            .ty(TypeBuilder::new("Flow").method(MethodBuilder::new("Run").body(body)))
            .build();

        let decoded = roundtrip(&module);
        let body = decoded.types[0].methods[0].body.as_ref().unwrap();
        let ids = body.ids();

        // ldc 0, switch, ldc 1, brfalse, endfinally, ret
        assert_eq!(body.len(), 6);
        assert_eq!(
            body.get(ids[1]).unwrap().operand,
            Operand::Switch(vec![ids[5], ids[2]])
        );
        assert_eq!(body.get(ids[3]).unwrap().operand, Operand::Branch(ids[5]));
        assert_eq!(body.handlers[0].try_start, ids[2]);
        assert_eq!(body.handlers[0].handler_start, ids[4]);
        assert_eq!(body.handlers[0].handler_end, Some(ids[5]));
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_max_stack_recomputed() {
        let mut module = fixtures::game_module();
        module.types[0].methods[0].body.as_mut().unwrap().max_stack = 0;

        let decoded = roundtrip(&module);
        assert_eq!(decoded.types[0].methods[0].body.as_ref().unwrap().max_stack, 1);
    }

    #[test]
    fn test_checksum_mismatch_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = fixtures::write_module(tmp.path(), &fixtures::game_module());

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        match read_module_shallow(&path).unwrap_err() {
            ReadError::Malformed { source, .. } => assert!(source.message.contains("checksum")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Game.dll");
        fs::write(&path, b"MZ\x90\x00 definitely not a module").unwrap();

        assert!(matches!(
            read_module_shallow(&path),
            Err(ReadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            read_module_shallow(&tmp.path().join("nope.dll")),
            Err(ReadError::Io { .. })
        ));
    }

    #[test]
    fn test_unknown_callee_rejected_on_encode() {
        let mut module = fixtures::game_module();
        module.types[0].methods[0]
            .body
            .as_mut()
            .unwrap()
            .push(Instruction::call(MethodToken::Ref(7)));

        assert!(matches!(
            encode_module(&module),
            Err(WriteError::Invalid { .. })
        ));
    }

    #[test]
    fn test_full_read_verifies_references() {
        let tmp = TempDir::new().unwrap();
        let mut game = fixtures::game_module();
        game.import_method(
            "UnityEngine",
            "UnityEngine.Debug",
            "LogError",
            MethodSig::static_method(1, false),
        );
        let path = fixtures::write_module(tmp.path(), &game);
        fixtures::write_module(tmp.path(), &fixtures::sink_module());

        let mut resolver = SearchPathResolver::new([tmp.path()].into_iter().collect());
        let err = read_module(&path, &mut resolver, &ReaderParameters::default()).unwrap_err();
        assert!(matches!(err, ReadError::UnresolvedReference { .. }));

        let shallow = ReaderParameters {
            mode: ReadMode::Shallow,
            ..ReaderParameters::default()
        };
        assert!(read_module(&path, &mut resolver, &shallow).is_ok());
    }

    #[test]
    fn test_write_with_symbols_emits_mdb() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Game.dll");
        let module = fixtures::game_module_with_symbols();
        let config = SymbolConfig {
            read: None,
            write: Some(symbols::canonical_path(&path)),
        };

        write_module(&module, &path, &config).unwrap();
        assert!(tmp.path().join("Game.dll.mdb").is_file());

        let mut resolver = SearchPathResolver::new(Default::default());
        let params = ReaderParameters {
            mode: ReadMode::Shallow,
            symbols: SymbolConfig {
                read: Some(SymbolSource {
                    format: SymbolFormat::Mdb,
                    path: tmp.path().join("Game.dll.mdb"),
                }),
                write: None,
            },
        };
        let reread = read_module(&path, &mut resolver, &params).unwrap();
        let body = reread.types[0].methods[0].body.as_ref().unwrap();
        assert_eq!(body.sequence_points.len(), 2);
        assert_eq!(reread.symbols.unwrap().source_format, SymbolFormat::Mdb);
    }

    #[test]
    fn test_failed_write_leaves_original() {
        let tmp = TempDir::new().unwrap();
        let path = fixtures::write_module(tmp.path(), &fixtures::game_module());
        let before = fs::read(&path).unwrap();

        // Popping after `ret` underflows the stack
        let mut broken = fixtures::game_module();
        let body = broken.types[0].methods[0].body.as_mut().unwrap();
        body.push(Instruction::simple(OpCode::Pop));

        let err = write_module(&broken, &path, &SymbolConfig::none()).unwrap_err();
        assert!(matches!(err, WriteError::Invalid { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
