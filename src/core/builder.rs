//! Builders for assembling modules in code.
//!
//! Used by tests and by tools that generate modules from scratch.
//!
//! ```
//! use ilweave::core::{Instruction, MethodBuilder, ModuleBuilder, TypeBuilder};
//!
//! let module = ModuleBuilder::new("Game")
//!     .ty(TypeBuilder::new("Game.Player")
//!         .method(MethodBuilder::new("Update")
//!             .attribute("LogAttribute")
//!             .instr(Instruction::nop())
//!             .instr(Instruction::ret())))
//!     .build();
//!
//! assert_eq!(module.types[0].methods[0].instruction_count(), 2);
//! ```

use crate::core::body::MethodBody;
use crate::core::instruction::Instruction;
use crate::core::module::{
    CustomAttribute, MethodDef, MethodFlags, MethodSig, Module, TypeDef, TypeRef,
};

/// Builds a [`MethodDef`].
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    method: MethodDef,
}

impl MethodBuilder {
    /// A static, parameterless, void method without a body.
    pub fn new(name: impl Into<String>) -> Self {
        MethodBuilder {
            method: MethodDef {
                name: name.into(),
                flags: MethodFlags::STATIC,
                sig: MethodSig::static_method(0, false),
                attributes: Vec::new(),
                body: None,
            },
        }
    }

    /// Make this an instance method.
    pub fn instance(mut self) -> Self {
        self.method.flags.remove(MethodFlags::STATIC);
        self.method.sig.has_this = true;
        self
    }

    pub fn params(mut self, count: u8) -> Self {
        self.method.sig.param_count = count;
        self
    }

    pub fn returns_value(mut self) -> Self {
        self.method.sig.returns_value = true;
        self
    }

    /// Mark abstract; abstract methods have no body.
    pub fn abstract_method(mut self) -> Self {
        self.method.flags.insert(MethodFlags::ABSTRACT);
        self.method.body = None;
        self
    }

    /// Mark as implemented outside the module.
    pub fn external(mut self) -> Self {
        self.method.flags.insert(MethodFlags::EXTERNAL);
        self.method.body = None;
        self
    }

    /// Attach an attribute declared in this module.
    pub fn attribute(mut self, full_name: impl Into<String>) -> Self {
        self.method
            .attributes
            .push(CustomAttribute::new(TypeRef::local(full_name)));
        self
    }

    /// Attach an attribute declared in a referenced module.
    pub fn attribute_from(mut self, scope: u32, full_name: impl Into<String>) -> Self {
        self.method
            .attributes
            .push(CustomAttribute::new(TypeRef::external(scope, full_name)));
        self
    }

    /// Give the method an empty body.
    pub fn empty_body(mut self) -> Self {
        self.method.body = Some(MethodBody::new());
        self
    }

    /// Append an instruction, creating the body if needed.
    pub fn instr(mut self, instruction: Instruction) -> Self {
        self.method
            .body
            .get_or_insert_with(MethodBody::new)
            .push(instruction);
        self
    }

    /// Append several instructions.
    pub fn instrs(self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        instructions.into_iter().fold(self, MethodBuilder::instr)
    }

    /// Use a prepared body.
    pub fn body(mut self, body: MethodBody) -> Self {
        self.method.body = Some(body);
        self
    }

    pub fn build(self) -> MethodDef {
        self.method
    }
}

/// Builds a [`TypeDef`].
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    ty: TypeDef,
}

impl TypeBuilder {
    pub fn new(full_name: impl Into<String>) -> Self {
        TypeBuilder {
            ty: TypeDef::new(full_name),
        }
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.ty.methods.push(method.build());
        self
    }

    pub fn build(self) -> TypeDef {
        self.ty
    }
}

/// Builds a [`Module`].
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleBuilder {
            module: Module::new(name),
        }
    }

    /// Add a module reference; its index is its insertion position.
    pub fn module_ref(mut self, name: &str) -> Self {
        self.module.module_ref(name);
        self
    }

    /// Import an external method into the member-reference table.
    pub fn ty(mut self, ty: TypeBuilder) -> Self {
        self.module.types.push(ty.build());
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}
