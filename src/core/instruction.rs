//! Instructions of the stack bytecode.
//!
//! An [`Instruction`] is an [`OpCode`] plus an [`Operand`]. Branch operands
//! refer to other instructions by [`InstrId`], never by position, so inserting
//! code into a body does not disturb existing jumps.

use std::fmt;

use crate::core::body::InstrId;
use crate::core::module::{MethodSig, MethodToken};

/// The operand shape an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    I32,
    I64,
    F64,
    String,
    Arg,
    Local,
    Method,
    Branch,
    Switch,
}

/// Opcodes of the stack machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Nop,
    LdArg,
    StArg,
    LdLoc,
    StLoc,
    LdcI4,
    LdcI8,
    LdcR8,
    LdStr,
    LdNull,
    Dup,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Ceq,
    Clt,
    Cgt,
    Br,
    BrTrue,
    BrFalse,
    Switch,
    Leave,
    EndFinally,
    Throw,
    Ret,
    Call,
}

impl OpCode {
    /// Every opcode, in encoding order.
    pub const ALL: [OpCode; 28] = [
        OpCode::Nop,
        OpCode::LdArg,
        OpCode::StArg,
        OpCode::LdLoc,
        OpCode::StLoc,
        OpCode::LdcI4,
        OpCode::LdcI8,
        OpCode::LdcR8,
        OpCode::LdStr,
        OpCode::LdNull,
        OpCode::Dup,
        OpCode::Pop,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Ceq,
        OpCode::Clt,
        OpCode::Cgt,
        OpCode::Br,
        OpCode::BrTrue,
        OpCode::BrFalse,
        OpCode::Switch,
        OpCode::Leave,
        OpCode::EndFinally,
        OpCode::Throw,
        OpCode::Ret,
        OpCode::Call,
    ];

    /// Byte used for this opcode in the module format.
    pub fn code(self) -> u8 {
        match self {
            OpCode::Nop => 0x00,
            OpCode::LdArg => 0x01,
            OpCode::StArg => 0x02,
            OpCode::LdLoc => 0x03,
            OpCode::StLoc => 0x04,
            OpCode::LdcI4 => 0x05,
            OpCode::LdcI8 => 0x06,
            OpCode::LdcR8 => 0x07,
            OpCode::LdStr => 0x08,
            OpCode::LdNull => 0x09,
            OpCode::Dup => 0x0a,
            OpCode::Pop => 0x0b,
            OpCode::Add => 0x10,
            OpCode::Sub => 0x11,
            OpCode::Mul => 0x12,
            OpCode::Div => 0x13,
            OpCode::Ceq => 0x14,
            OpCode::Clt => 0x15,
            OpCode::Cgt => 0x16,
            OpCode::Br => 0x20,
            OpCode::BrTrue => 0x21,
            OpCode::BrFalse => 0x22,
            OpCode::Switch => 0x23,
            OpCode::Leave => 0x24,
            OpCode::EndFinally => 0x25,
            OpCode::Throw => 0x26,
            OpCode::Ret => 0x27,
            OpCode::Call => 0x28,
        }
    }

    /// Decode an opcode byte.
    pub fn from_code(code: u8) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::LdArg => "ldarg",
            OpCode::StArg => "starg",
            OpCode::LdLoc => "ldloc",
            OpCode::StLoc => "stloc",
            OpCode::LdcI4 => "ldc.i4",
            OpCode::LdcI8 => "ldc.i8",
            OpCode::LdcR8 => "ldc.r8",
            OpCode::LdStr => "ldstr",
            OpCode::LdNull => "ldnull",
            OpCode::Dup => "dup",
            OpCode::Pop => "pop",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Ceq => "ceq",
            OpCode::Clt => "clt",
            OpCode::Cgt => "cgt",
            OpCode::Br => "br",
            OpCode::BrTrue => "brtrue",
            OpCode::BrFalse => "brfalse",
            OpCode::Switch => "switch",
            OpCode::Leave => "leave",
            OpCode::EndFinally => "endfinally",
            OpCode::Throw => "throw",
            OpCode::Ret => "ret",
            OpCode::Call => "call",
        }
    }

    /// The operand shape this opcode carries.
    pub fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::LdArg | OpCode::StArg => OperandKind::Arg,
            OpCode::LdLoc | OpCode::StLoc => OperandKind::Local,
            OpCode::LdcI4 => OperandKind::I32,
            OpCode::LdcI8 => OperandKind::I64,
            OpCode::LdcR8 => OperandKind::F64,
            OpCode::LdStr => OperandKind::String,
            OpCode::Br | OpCode::BrTrue | OpCode::BrFalse | OpCode::Leave => OperandKind::Branch,
            OpCode::Switch => OperandKind::Switch,
            OpCode::Call => OperandKind::Method,
            _ => OperandKind::None,
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn ends_flow(self) -> bool {
        matches!(
            self,
            OpCode::Br | OpCode::Leave | OpCode::EndFinally | OpCode::Throw | OpCode::Ret
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Arg(u16),
    Local(u16),
    Method(MethodToken),
    Branch(InstrId),
    Switch(Vec<InstrId>),
}

impl Operand {
    /// The shape of this operand.
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::I32(_) => OperandKind::I32,
            Operand::I64(_) => OperandKind::I64,
            Operand::F64(_) => OperandKind::F64,
            Operand::String(_) => OperandKind::String,
            Operand::Arg(_) => OperandKind::Arg,
            Operand::Local(_) => OperandKind::Local,
            Operand::Method(_) => OperandKind::Method,
            Operand::Branch(_) => OperandKind::Branch,
            Operand::Switch(_) => OperandKind::Switch,
        }
    }

    /// Instructions this operand jumps to.
    pub fn targets(&self) -> &[InstrId] {
        match self {
            Operand::Branch(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction. Panics if the operand shape does not fit the opcode.
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        assert_eq!(
            opcode.operand_kind(),
            operand.kind(),
            "operand does not fit `{}`",
            opcode
        );
        Instruction { opcode, operand }
    }

    /// An instruction without operand.
    pub fn simple(opcode: OpCode) -> Self {
        Instruction::new(opcode, Operand::None)
    }

    pub fn nop() -> Self {
        Instruction::simple(OpCode::Nop)
    }

    pub fn ret() -> Self {
        Instruction::simple(OpCode::Ret)
    }

    pub fn ldstr(value: impl Into<String>) -> Self {
        Instruction::new(OpCode::LdStr, Operand::String(value.into()))
    }

    pub fn ldc_i4(value: i32) -> Self {
        Instruction::new(OpCode::LdcI4, Operand::I32(value))
    }

    pub fn ldarg(index: u16) -> Self {
        Instruction::new(OpCode::LdArg, Operand::Arg(index))
    }

    pub fn ldloc(index: u16) -> Self {
        Instruction::new(OpCode::LdLoc, Operand::Local(index))
    }

    pub fn stloc(index: u16) -> Self {
        Instruction::new(OpCode::StLoc, Operand::Local(index))
    }

    pub fn call(token: MethodToken) -> Self {
        Instruction::new(OpCode::Call, Operand::Method(token))
    }

    pub fn branch(opcode: OpCode, target: InstrId) -> Self {
        Instruction::new(opcode, Operand::Branch(target))
    }

    /// Stack effect as `(pops, pushes)`.
    ///
    /// `callee` supplies the signature of a `call` target and `returns_value`
    /// tells whether `ret` consumes a value. Returns `None` for a call whose
    /// target signature is unknown.
    pub fn stack_effect(
        &self,
        callee: impl Fn(MethodToken) -> Option<MethodSig>,
        returns_value: bool,
    ) -> Option<(u32, u32)> {
        let effect = match self.opcode {
            OpCode::Nop | OpCode::Br | OpCode::Leave | OpCode::EndFinally => (0, 0),
            OpCode::LdArg
            | OpCode::LdLoc
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR8
            | OpCode::LdStr
            | OpCode::LdNull => (0, 1),
            OpCode::StArg
            | OpCode::StLoc
            | OpCode::Pop
            | OpCode::BrTrue
            | OpCode::BrFalse
            | OpCode::Switch
            | OpCode::Throw => (1, 0),
            OpCode::Dup => (1, 2),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Ceq
            | OpCode::Clt
            | OpCode::Cgt => (2, 1),
            OpCode::Ret => (u32::from(returns_value), 0),
            OpCode::Call => {
                let Operand::Method(token) = &self.operand else {
                    return None;
                };
                let sig = callee(*token)?;
                (sig.stack_inputs(), u32::from(sig.returns_value))
            }
        };
        Some(effect)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::I32(v) => write!(f, "{} {}", self.opcode, v),
            Operand::I64(v) => write!(f, "{} {}", self.opcode, v),
            Operand::F64(v) => write!(f, "{} {}", self.opcode, v),
            Operand::String(s) => write!(f, "{} {:?}", self.opcode, s),
            Operand::Arg(i) => write!(f, "{} arg.{}", self.opcode, i),
            Operand::Local(i) => write!(f, "{} loc.{}", self.opcode, i),
            Operand::Method(token) => write!(f, "{} {}", self.opcode, token),
            Operand::Branch(_) => write!(f, "{} <label>", self.opcode),
            Operand::Switch(targets) => write!(f, "{} ({} labels)", self.opcode, targets.len()),
        }
    }
}
