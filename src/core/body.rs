//! Method bodies.
//!
//! A [`MethodBody`] stores its instructions in a slot arena keyed by
//! [`InstrId`] and keeps program order in a separate list. Ids stay valid
//! across insertions, so branch operands, exception handler boundaries and
//! sequence points never need patching when code is woven in.

use std::collections::HashMap;

use slotmap::SlotMap;
use thiserror::Error;

use crate::core::instruction::{Instruction, OpCode};
use crate::core::module::{MethodSig, MethodToken};
use crate::core::symbols::SequencePoint;

slotmap::new_key_type! {
    /// Stable identifier of an instruction within one body.
    pub struct InstrId;
}

/// Structural problems in a method body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("instruction is not part of this body")]
    UnknownInstruction,

    #[error("instruction {at} jumps outside the body")]
    DanglingBranch { at: usize },

    #[error("exception handler #{index} references an instruction outside the body")]
    InvalidHandler { index: usize },

    #[error("stack underflow at instruction {at}")]
    StackUnderflow { at: usize },

    #[error("instruction {at} calls a method with an unknown signature")]
    UnknownCallee { at: usize },
}

/// Kind of exception handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Catch,
    Finally,
}

/// A protected region and its handler.
///
/// `*_end` boundaries are exclusive; `None` means the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: InstrId,
    pub try_end: Option<InstrId>,
    pub handler_start: InstrId,
    pub handler_end: Option<InstrId>,
    /// Full name of the caught type, for catch handlers
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    fn boundaries(&self) -> impl Iterator<Item = InstrId> {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
        ]
        .into_iter()
        .flatten()
    }
}

/// The executable body of a method.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    arena: SlotMap<InstrId, Instruction>,
    order: Vec<InstrId>,

    /// Maximum evaluation stack depth, recomputed on write
    pub max_stack: u16,

    /// Number of local variable slots
    pub locals: u16,

    /// Exception handlers, innermost first
    pub handlers: Vec<ExceptionHandler>,

    /// Debug sequence points attached to instructions
    pub sequence_points: Vec<SequencePoint>,
}

impl MethodBody {
    /// Create an empty body.
    pub fn new() -> Self {
        MethodBody::default()
    }

    /// Create a body from a list of instructions.
    pub fn from_instructions(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        let mut body = MethodBody::new();
        for instruction in instructions {
            body.push(instruction);
        }
        body
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the body has no instructions.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append an instruction.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.arena.insert(instruction);
        self.order.push(id);
        id
    }

    /// Insert `instruction` immediately before `anchor`.
    ///
    /// The anchor keeps its id and every jump that targeted it still does.
    pub fn insert_before(
        &mut self,
        anchor: InstrId,
        instruction: Instruction,
    ) -> Result<InstrId, BodyError> {
        let pos = self.position(anchor).ok_or(BodyError::UnknownInstruction)?;
        Ok(self.insert_at(pos, instruction))
    }

    /// Insert `instruction` at position `pos` in program order.
    ///
    /// # Panics
    ///
    /// Panics if `pos > len`.
    pub fn insert_at(&mut self, pos: usize, instruction: Instruction) -> InstrId {
        assert!(pos <= self.order.len(), "insert position {} out of bounds", pos);
        let id = self.arena.insert(instruction);
        self.order.insert(pos, id);
        id
    }

    /// First instruction in program order.
    pub fn first(&self) -> Option<InstrId> {
        self.order.first().copied()
    }

    /// Last instruction in program order.
    pub fn last(&self) -> Option<InstrId> {
        self.order.last().copied()
    }

    /// Instruction ids in program order.
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// Look up an instruction.
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id)
    }

    /// Look up an instruction mutably.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.arena.get_mut(id)
    }

    /// Whether `id` belongs to this body.
    pub fn contains(&self, id: InstrId) -> bool {
        self.arena.contains_key(id)
    }

    /// Position of an instruction in program order.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|&candidate| candidate == id)
    }

    /// Map from id to position, for encoding.
    pub fn positions(&self) -> HashMap<InstrId, usize> {
        self.order
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect()
    }

    /// Iterate instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order.iter().map(move |&id| (id, &self.arena[id]))
    }

    /// Iterate instructions without ids.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.order.iter().map(move |&id| &self.arena[id])
    }

    /// Check that every branch target and handler boundary lives in this body.
    pub fn validate(&self) -> Result<(), BodyError> {
        for (at, (_, instruction)) in self.iter().enumerate() {
            if instruction
                .operand
                .targets()
                .iter()
                .any(|&target| !self.contains(target))
            {
                return Err(BodyError::DanglingBranch { at });
            }
        }

        for (index, handler) in self.handlers.iter().enumerate() {
            if handler.boundaries().any(|id| !self.contains(id)) {
                return Err(BodyError::InvalidHandler { index });
            }
        }

        Ok(())
    }

    /// Compute the maximum evaluation stack depth.
    ///
    /// Walks the body in order, carrying the depth recorded at branch targets
    /// and handler entries. Catch handlers start with the exception object on
    /// the stack.
    pub fn compute_max_stack(
        &self,
        callee: impl Fn(MethodToken) -> Option<MethodSig>,
        returns_value: bool,
    ) -> Result<u16, BodyError> {
        let mut recorded: HashMap<InstrId, u32> = HashMap::new();
        for handler in &self.handlers {
            let depth = match handler.kind {
                HandlerKind::Catch => 1,
                HandlerKind::Finally => 0,
            };
            recorded.insert(handler.handler_start, depth);
        }

        let mut depth: u32 = 0;
        let mut max: u32 = 0;

        for (at, (id, instruction)) in self.iter().enumerate() {
            if let Some(&known) = recorded.get(&id) {
                depth = known;
            }

            let (pops, pushes) = instruction
                .stack_effect(&callee, returns_value)
                .ok_or(BodyError::UnknownCallee { at })?;

            depth = depth
                .checked_sub(pops)
                .ok_or(BodyError::StackUnderflow { at })?;
            depth += pushes;
            max = max.max(depth);

            let target_depth = if instruction.opcode == OpCode::Leave {
                0
            } else {
                depth
            };
            for &target in instruction.operand.targets() {
                recorded.entry(target).or_insert(target_depth);
            }

            if instruction.opcode.ends_flow() {
                depth = 0;
            }
        }

        Ok(u16::try_from(max).unwrap_or(u16::MAX))
    }
}
