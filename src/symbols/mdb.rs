//! `mdb` symbol files, the canonical output format.
//!
//! Layout: magic `b"ILMD"`, u16 version, module name, document table, then
//! per method its `Type::Method(params)` key followed by points as
//! `(offset, line, column, document)`. Overloads sharing a key are told
//! apart by a `#n` suffix.

use crate::codec::bytes::{ByteReader, ByteWriter, DecodeError};
use crate::core::Module;
use crate::symbols::{body_points, method_keys, MethodKey, RawPoint, SymbolTable};

pub const MAGIC: [u8; 4] = *b"ILMD";
pub const VERSION: u16 = 1;

/// Encode the symbols of `module` as an `mdb` file.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.bytes(&MAGIC);
    w.u16(VERSION);
    w.str(&module.name);

    let documents = module
        .symbols
        .as_ref()
        .map(|s| s.documents.as_slice())
        .unwrap_or_default();
    w.count(documents.len());
    for doc in documents {
        w.str(doc);
    }

    let methods: Vec<(String, Vec<RawPoint>)> = method_keys(module)
        .into_iter()
        .filter_map(|((t, m), key)| {
            let body = module.types[t].methods[m].body.as_ref()?;
            let points = body_points(body);
            (!points.is_empty()).then_some((key, points))
        })
        .collect();

    w.count(methods.len());
    for (key, points) in methods {
        w.str(&key);
        w.count(points.len());
        for p in points {
            w.u32(p.offset);
            w.u32(p.line);
            w.u16(p.column);
            w.u32(p.document);
        }
    }

    w.into_inner()
}

pub(crate) fn decode(bytes: &[u8]) -> Result<SymbolTable, DecodeError> {
    let mut r = ByteReader::new(bytes);

    if r.take(4)? != MAGIC {
        return Err(DecodeError::new(0, "not an mdb symbol file (bad magic)"));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(DecodeError::new(
            4,
            format!("unsupported mdb version {}", version),
        ));
    }

    let mut table = SymbolTable {
        module_name: Some(r.str()?),
        ..SymbolTable::default()
    };

    let count = r.count("document")?;
    for _ in 0..count {
        table.documents.push(r.str()?);
    }

    let count = r.count("method")?;
    for _ in 0..count {
        let key = MethodKey::Name(r.str()?);
        let point_count = r.count("sequence point")?;
        let mut points = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let offset = r.u32()?;
            let line = r.u32()?;
            let column = r.u16()?;
            let document = r.u32()?;
            points.push(RawPoint {
                offset,
                document,
                line,
                column,
            });
        }
        table.methods.push((key, points));
    }

    if !r.is_empty() {
        return Err(r.error("trailing bytes after symbol table"));
    }

    Ok(table)
}
