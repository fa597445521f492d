//! Core data structures for ilweave.
//!
//! This module contains the in-memory object graph of a compiled module:
//! - Modules, types and methods with their attributes
//! - Method bodies as instruction arenas with stable ids
//! - Instructions and opcodes of the stack bytecode
//! - Debug symbol data

pub mod body;
pub mod builder;
pub mod instruction;
pub mod module;
pub mod symbols;

pub use body::{BodyError, ExceptionHandler, HandlerKind, InstrId, MethodBody};
pub use builder::{MethodBuilder, ModuleBuilder, TypeBuilder};
pub use instruction::{Instruction, OpCode, Operand, OperandKind};
pub use module::{
    CustomAttribute, MemberRef, MethodDef, MethodFlags, MethodSig, MethodToken, Module, TypeDef,
    TypeRef,
};
pub use symbols::{SequencePoint, SymbolData, SymbolFormat};
