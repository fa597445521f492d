//! Module encoding.

use std::collections::HashMap;

use crate::codec::bytes::ByteWriter;
use crate::codec::header::Header;
use crate::codec::WriteError;
use crate::core::{
    BodyError, CustomAttribute, ExceptionHandler, HandlerKind, InstrId, MethodBody, MethodDef,
    MethodSig, MethodToken, Module, Operand,
};

/// Encode a module into the bytes of a module file.
///
/// Every body is validated and its `max_stack` recomputed, so code inserted
/// by the weaver is always written with a correct stack bound.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, WriteError> {
    let mut w = ByteWriter::new();

    w.str(&module.name);

    w.count(module.module_refs.len());
    for name in &module.module_refs {
        w.str(name);
    }

    w.count(module.member_refs.len());
    for member in &module.member_refs {
        w.u32(member.module);
        w.str(&member.type_name);
        w.str(&member.method_name);
        sig(&mut w, member.sig);
    }

    w.count(module.types.len());
    for ty in &module.types {
        w.str(&ty.full_name);
        w.count(ty.methods.len());
        for method in &ty.methods {
            encode_method(&mut w, module, method).map_err(|source| WriteError::Invalid {
                method: format!("{}::{}", ty.full_name, method.name),
                source,
            })?;
        }
    }

    let payload = w.into_inner();
    let header = Header::for_payload(&payload);

    let mut bytes = Vec::with_capacity(header.to_bytes().len() + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn sig(w: &mut ByteWriter, sig: MethodSig) {
    let mut flags = 0u8;
    if sig.has_this {
        flags |= 0b01;
    }
    if sig.returns_value {
        flags |= 0b10;
    }
    w.u8(flags);
    w.u8(sig.param_count);
}

fn encode_method(w: &mut ByteWriter, module: &Module, method: &MethodDef) -> Result<(), BodyError> {
    w.str(&method.name);
    w.u16(method.flags.bits());
    sig(w, method.sig);

    w.count(method.attributes.len());
    for attr in &method.attributes {
        attribute(w, attr);
    }

    match &method.body {
        Some(body) => {
            w.bool(true);
            encode_body(w, module, body, method.sig.returns_value)
        }
        None => {
            w.bool(false);
            Ok(())
        }
    }
}

fn attribute(w: &mut ByteWriter, attr: &CustomAttribute) {
    match attr.attribute_type.scope {
        None => w.u8(0),
        Some(scope) => {
            w.u8(1);
            w.u32(scope);
        }
    }
    w.str(&attr.attribute_type.full_name);
}

fn encode_body(
    w: &mut ByteWriter,
    module: &Module,
    body: &MethodBody,
    returns_value: bool,
) -> Result<(), BodyError> {
    body.validate()?;
    let max_stack = body.compute_max_stack(|token| module.method_sig(token), returns_value)?;
    let positions = body.positions();

    w.u16(max_stack);
    w.u16(body.locals);

    w.count(body.len());
    for instruction in body.instructions() {
        w.u8(instruction.opcode.code());
        match &instruction.operand {
            Operand::None => {}
            Operand::I32(v) => w.i32(*v),
            Operand::I64(v) => w.i64(*v),
            Operand::F64(v) => w.f64(*v),
            Operand::String(s) => w.str(s),
            Operand::Arg(i) | Operand::Local(i) => w.u16(*i),
            Operand::Method(token) => match *token {
                MethodToken::Def {
                    type_index,
                    method_index,
                } => {
                    w.u8(0);
                    w.u32(type_index);
                    w.u32(method_index);
                }
                MethodToken::Ref(index) => {
                    w.u8(1);
                    w.u32(index);
                }
            },
            Operand::Branch(target) => w.u32(positions[target] as u32),
            Operand::Switch(targets) => {
                w.count(targets.len());
                for target in targets {
                    w.u32(positions[target] as u32);
                }
            }
        }
    }

    w.count(body.handlers.len());
    for handler in &body.handlers {
        encode_handler(w, handler, &positions, body.len());
    }

    Ok(())
}

fn encode_handler(
    w: &mut ByteWriter,
    handler: &ExceptionHandler,
    positions: &HashMap<InstrId, usize>,
    len: usize,
) {
    let boundary = |id: Option<InstrId>| id.map_or(len, |id| positions[&id]) as u32;

    w.u8(match handler.kind {
        HandlerKind::Catch => 0,
        HandlerKind::Finally => 1,
    });
    w.u32(boundary(Some(handler.try_start)));
    w.u32(boundary(handler.try_end));
    w.u32(boundary(Some(handler.handler_start)));
    w.u32(boundary(handler.handler_end));
    match &handler.catch_type {
        Some(name) => {
            w.bool(true);
            w.str(name);
        }
        None => w.bool(false),
    }
}
