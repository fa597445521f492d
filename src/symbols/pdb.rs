//! `pdb` symbol files.
//!
//! Layout: magic `b"ILPD"`, u16 version, document table, then per method
//! `(type index, method index)` followed by its points as
//! `(offset, document, line, column)`.

use crate::codec::bytes::{ByteReader, ByteWriter, DecodeError};
use crate::core::Module;
use crate::symbols::{body_points, MethodKey, RawPoint, SymbolTable};

pub const MAGIC: [u8; 4] = *b"ILPD";
pub const VERSION: u16 = 1;

/// Encode the symbols of `module` as a `pdb` file.
///
/// The tool never writes this format itself; it exists so fixtures and
/// external producers share one definition of the layout.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.bytes(&MAGIC);
    w.u16(VERSION);

    let documents = module
        .symbols
        .as_ref()
        .map(|s| s.documents.as_slice())
        .unwrap_or_default();
    w.count(documents.len());
    for doc in documents {
        w.str(doc);
    }

    let mut methods = Vec::new();
    for (t, ty) in module.types.iter().enumerate() {
        for (m, method) in ty.methods.iter().enumerate() {
            if let Some(body) = &method.body {
                let points = body_points(body);
                if !points.is_empty() {
                    methods.push((t as u32, m as u32, points));
                }
            }
        }
    }

    w.count(methods.len());
    for (type_index, method_index, points) in methods {
        w.u32(type_index);
        w.u32(method_index);
        w.count(points.len());
        for p in points {
            w.u32(p.offset);
            w.u32(p.document);
            w.u32(p.line);
            w.u16(p.column);
        }
    }

    w.into_inner()
}

pub(crate) fn decode(bytes: &[u8]) -> Result<SymbolTable, DecodeError> {
    let mut r = ByteReader::new(bytes);

    if r.take(4)? != MAGIC {
        return Err(DecodeError::new(0, "not a pdb symbol file (bad magic)"));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(DecodeError::new(
            4,
            format!("unsupported pdb version {}", version),
        ));
    }

    let mut table = SymbolTable::default();

    let count = r.count("document")?;
    for _ in 0..count {
        table.documents.push(r.str()?);
    }

    let count = r.count("method")?;
    for _ in 0..count {
        let key = MethodKey::Index {
            type_index: r.u32()?,
            method_index: r.u32()?,
        };
        let point_count = r.count("sequence point")?;
        let mut points = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            points.push(RawPoint {
                offset: r.u32()?,
                document: r.u32()?,
                line: r.u32()?,
                column: r.u16()?,
            });
        }
        table.methods.push((key, points));
    }

    if !r.is_empty() {
        return Err(r.error("trailing bytes after symbol table"));
    }

    Ok(table)
}
