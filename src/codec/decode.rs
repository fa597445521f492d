//! Module decoding.

use crate::codec::bytes::{ByteReader, DecodeError};
use crate::codec::header::{Header, HEADER_SIZE};
use crate::core::{
    CustomAttribute, ExceptionHandler, HandlerKind, InstrId, Instruction, MemberRef, MethodBody,
    MethodDef, MethodFlags, MethodSig, MethodToken, Module, OpCode, Operand, OperandKind, TypeDef,
    TypeRef,
};

/// A `Def` token seen while decoding, checked once every type is known.
struct PendingDef {
    offset: usize,
    type_index: u32,
    method_index: u32,
}

/// Decode a module from the full contents of a module file.
pub fn decode_module(bytes: &[u8]) -> Result<Module, DecodeError> {
    let header = Header::from_bytes(bytes)?;
    let payload = &bytes[HEADER_SIZE..];
    header.validate(payload)?;

    let mut decoder = Decoder {
        r: ByteReader::with_base(payload, HEADER_SIZE),
        pending: Vec::new(),
    };
    let module = decoder.module()?;

    if !decoder.r.is_empty() {
        return Err(decoder.r.error("trailing bytes after module"));
    }

    for def in &decoder.pending {
        let exists = module
            .types
            .get(def.type_index as usize)
            .is_some_and(|ty| (def.method_index as usize) < ty.methods.len());
        if !exists {
            return Err(DecodeError::new(
                def.offset,
                format!(
                    "call to undefined method def[{}:{}]",
                    def.type_index, def.method_index
                ),
            ));
        }
    }

    Ok(module)
}

struct Decoder<'a> {
    r: ByteReader<'a>,
    pending: Vec<PendingDef>,
}

impl Decoder<'_> {
    fn module(&mut self) -> Result<Module, DecodeError> {
        let mut module = Module::new(self.r.str()?);

        let count = self.r.count("module reference")?;
        for _ in 0..count {
            module.module_refs.push(self.r.str()?);
        }

        let count = self.r.count("member reference")?;
        for _ in 0..count {
            let offset = self.r.offset();
            let member = MemberRef {
                module: self.r.u32()?,
                type_name: self.r.str()?,
                method_name: self.r.str()?,
                sig: self.sig()?,
            };
            if member.module as usize >= module.module_refs.len() {
                return Err(DecodeError::new(
                    offset,
                    format!("member reference points at missing module #{}", member.module),
                ));
            }
            module.member_refs.push(member);
        }

        let count = self.r.count("type")?;
        for _ in 0..count {
            let ty = self.type_def(&module)?;
            module.types.push(ty);
        }

        Ok(module)
    }

    fn sig(&mut self) -> Result<MethodSig, DecodeError> {
        let offset = self.r.offset();
        let flags = self.r.u8()?;
        if flags & !0b11 != 0 {
            return Err(DecodeError::new(
                offset,
                format!("unknown signature flags {:#04x}", flags),
            ));
        }
        Ok(MethodSig {
            has_this: flags & 0b01 != 0,
            returns_value: flags & 0b10 != 0,
            param_count: self.r.u8()?,
        })
    }

    fn type_def(&mut self, module: &Module) -> Result<TypeDef, DecodeError> {
        let mut ty = TypeDef::new(self.r.str()?);
        let count = self.r.count("method")?;
        for _ in 0..count {
            let method = self.method(module)?;
            ty.methods.push(method);
        }
        Ok(ty)
    }

    fn method(&mut self, module: &Module) -> Result<MethodDef, DecodeError> {
        let name = self.r.str()?;

        let offset = self.r.offset();
        let bits = self.r.u16()?;
        let flags = MethodFlags::from_bits(bits).ok_or_else(|| {
            DecodeError::new(offset, format!("unknown method flags {:#06x}", bits))
        })?;

        let sig = self.sig()?;

        let count = self.r.count("attribute")?;
        let mut attributes = Vec::with_capacity(count);
        for _ in 0..count {
            attributes.push(self.attribute(module)?);
        }

        let body = if self.r.bool()? {
            Some(self.body(module)?)
        } else {
            None
        };

        Ok(MethodDef {
            name,
            flags,
            sig,
            attributes,
            body,
        })
    }

    fn attribute(&mut self, module: &Module) -> Result<CustomAttribute, DecodeError> {
        let offset = self.r.offset();
        let scope = match self.r.u8()? {
            0 => None,
            1 => {
                let scope = self.r.u32()?;
                if scope as usize >= module.module_refs.len() {
                    return Err(DecodeError::new(
                        offset,
                        format!("attribute scope points at missing module #{}", scope),
                    ));
                }
                Some(scope)
            }
            tag => {
                return Err(DecodeError::new(
                    offset,
                    format!("invalid attribute scope tag {}", tag),
                ))
            }
        };
        Ok(CustomAttribute::new(TypeRef {
            scope,
            full_name: self.r.str()?,
        }))
    }

    fn body(&mut self, module: &Module) -> Result<MethodBody, DecodeError> {
        let mut body = MethodBody::new();
        body.max_stack = self.r.u16()?;
        body.locals = self.r.u16()?;

        let count = self.r.count("instruction")?;

        // Allocate ids first so forward branches can be resolved in one pass
        let ids: Vec<InstrId> = (0..count).map(|_| body.push(Instruction::nop())).collect();

        for &id in &ids {
            let instruction = self.instruction(module, &ids)?;
            if let Some(slot) = body.get_mut(id) {
                *slot = instruction;
            }
        }

        let handler_count = self.r.count("exception handler")?;
        for _ in 0..handler_count {
            let handler = self.handler(&ids)?;
            body.handlers.push(handler);
        }

        Ok(body)
    }

    fn instruction(&mut self, module: &Module, ids: &[InstrId]) -> Result<Instruction, DecodeError> {
        let offset = self.r.offset();
        let code = self.r.u8()?;
        let opcode = OpCode::from_code(code)
            .ok_or_else(|| DecodeError::new(offset, format!("unknown opcode {:#04x}", code)))?;

        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::I32 => Operand::I32(self.r.i32()?),
            OperandKind::I64 => Operand::I64(self.r.i64()?),
            OperandKind::F64 => Operand::F64(self.r.f64()?),
            OperandKind::String => Operand::String(self.r.str()?),
            OperandKind::Arg => Operand::Arg(self.r.u16()?),
            OperandKind::Local => Operand::Local(self.r.u16()?),
            OperandKind::Method => Operand::Method(self.token(module)?),
            OperandKind::Branch => Operand::Branch(self.target(ids)?),
            OperandKind::Switch => {
                let count = self.r.count("switch target")?;
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(self.target(ids)?);
                }
                Operand::Switch(targets)
            }
        };

        Ok(Instruction { opcode, operand })
    }

    fn token(&mut self, module: &Module) -> Result<MethodToken, DecodeError> {
        let offset = self.r.offset();
        match self.r.u8()? {
            0 => {
                let type_index = self.r.u32()?;
                let method_index = self.r.u32()?;
                self.pending.push(PendingDef {
                    offset,
                    type_index,
                    method_index,
                });
                Ok(MethodToken::Def {
                    type_index,
                    method_index,
                })
            }
            1 => {
                let index = self.r.u32()?;
                if index as usize >= module.member_refs.len() {
                    return Err(DecodeError::new(
                        offset,
                        format!("call to missing member reference #{}", index),
                    ));
                }
                Ok(MethodToken::Ref(index))
            }
            tag => Err(DecodeError::new(
                offset,
                format!("invalid method token tag {}", tag),
            )),
        }
    }

    fn target(&mut self, ids: &[InstrId]) -> Result<InstrId, DecodeError> {
        let offset = self.r.offset();
        let index = self.r.u32()? as usize;
        ids.get(index).copied().ok_or_else(|| {
            DecodeError::new(offset, format!("branch target {} is outside the body", index))
        })
    }

    /// Handler boundary; an index equal to the instruction count means the end.
    fn boundary(&mut self, ids: &[InstrId]) -> Result<Option<InstrId>, DecodeError> {
        let offset = self.r.offset();
        let index = self.r.u32()? as usize;
        if index == ids.len() {
            return Ok(None);
        }
        ids.get(index).copied().map(Some).ok_or_else(|| {
            DecodeError::new(
                offset,
                format!("handler boundary {} is outside the body", index),
            )
        })
    }

    fn handler(&mut self, ids: &[InstrId]) -> Result<ExceptionHandler, DecodeError> {
        let offset = self.r.offset();
        let kind = match self.r.u8()? {
            0 => HandlerKind::Catch,
            1 => HandlerKind::Finally,
            tag => {
                return Err(DecodeError::new(
                    offset,
                    format!("invalid handler kind {}", tag),
                ))
            }
        };

        let try_start = self
            .boundary(ids)?
            .ok_or_else(|| DecodeError::new(offset, "protected region starts past the body"))?;
        let try_end = self.boundary(ids)?;
        let handler_start = self
            .boundary(ids)?
            .ok_or_else(|| DecodeError::new(offset, "handler starts past the body"))?;
        let handler_end = self.boundary(ids)?;
        let catch_type = if self.r.bool()? {
            Some(self.r.str()?)
        } else {
            None
        };

        Ok(ExceptionHandler {
            kind,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bytes::ByteWriter;

    /// A module with one type and one method whose body is `body`.
    fn file_with_body(member_refs: u32, body: impl FnOnce(&mut ByteWriter)) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.str("Game");
        w.count(1);
        w.str("UnityEngine");
        w.count(member_refs as usize);
        for _ in 0..member_refs {
            w.u32(0);
            w.str("UnityEngine.Debug");
            w.str("Log");
            w.u8(0);
            w.u8(1);
        }
        w.count(1);
        w.str("Game.Player");
        w.count(1);
        w.str("Update");
        w.u16(MethodFlags::STATIC.bits());
        w.u8(0);
        w.u8(0);
        w.count(0);
        w.bool(true);
        w.u16(8);
        w.u16(0);
        body(&mut w);

        let payload = w.into_inner();
        let mut bytes = Header::for_payload(&payload).to_bytes().to_vec();
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[test]
    fn test_decode_minimal() {
        let bytes = file_with_body(1, |w| {
            w.count(3);
            w.u8(OpCode::LdStr.code());
            w.str("hi");
            w.u8(OpCode::Call.code());
            w.u8(1);
            w.u32(0);
            w.u8(OpCode::Ret.code());
            w.count(0);
        });

        let module = decode_module(&bytes).unwrap();
        let body = module.types[0].methods[0].body.as_ref().unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body.max_stack, 8);
        assert_eq!(
            body.instructions().nth(1).unwrap().operand,
            Operand::Method(MethodToken::Ref(0))
        );
    }

    #[test]
    fn test_member_ref_out_of_range() {
        let bytes = file_with_body(0, |w| {
            w.count(1);
            w.u8(OpCode::Call.code());
            w.u8(1);
            w.u32(3);
            w.count(0);
        });

        let err = decode_module(&bytes).unwrap_err();
        assert!(err.message.contains("member reference #3"));
    }

    #[test]
    fn test_undefined_def_token() {
        let bytes = file_with_body(0, |w| {
            w.count(1);
            w.u8(OpCode::Call.code());
            w.u8(0);
            w.u32(0);
            w.u32(5);
            w.count(0);
        });

        let err = decode_module(&bytes).unwrap_err();
        assert!(err.message.contains("def[0:5]"));
    }

    #[test]
    fn test_branch_outside_body() {
        let bytes = file_with_body(0, |w| {
            w.count(2);
            w.u8(OpCode::Br.code());
            w.u32(2);
            w.u8(OpCode::Ret.code());
            w.count(0);
        });

        let err = decode_module(&bytes).unwrap_err();
        assert!(err.message.contains("branch target 2"));
    }

    #[test]
    fn test_handler_end_of_body() {
        let bytes = file_with_body(0, |w| {
            w.count(2);
            w.u8(OpCode::Nop.code());
            w.u8(OpCode::EndFinally.code());
            w.count(1);
            w.u8(1);
            w.u32(0);
            w.u32(1);
            w.u32(1);
            w.u32(2);
            w.bool(false);
        });

        let module = decode_module(&bytes).unwrap();
        let body = module.types[0].methods[0].body.as_ref().unwrap();
        assert_eq!(body.handlers[0].kind, HandlerKind::Finally);
        assert_eq!(body.handlers[0].handler_end, None);
        assert_eq!(body.handlers[0].try_end, Some(body.ids()[1]));
    }

    #[test]
    fn test_unknown_opcode() {
        let bytes = file_with_body(0, |w| {
            w.count(1);
            w.u8(0xee);
            w.count(0);
        });

        let err = decode_module(&bytes).unwrap_err();
        assert!(err.message.contains("unknown opcode 0xee"));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = file_with_body(0, |w| {
            w.count(0);
            w.count(0);
        });
        // Append to the payload and fix up the header
        let mut payload = bytes.split_off(HEADER_SIZE);
        payload.push(0);
        let mut bytes = Header::for_payload(&payload).to_bytes().to_vec();
        bytes.extend_from_slice(&payload);

        let err = decode_module(&bytes).unwrap_err();
        assert!(err.message.contains("trailing"));
    }
}
