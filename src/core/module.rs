//! Modules, types and methods.
//!
//! A [`Module`] owns its types, each [`TypeDef`] owns its methods. Calls to
//! methods in other modules go through the module's member-reference table,
//! which names the external module through the module-reference table.

use std::fmt;

use crate::core::body::MethodBody;
use crate::core::symbols::SymbolData;

/// Calling shape of a method, enough to compute stack effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Instance method (receives `this` as an extra stack input)
    pub has_this: bool,
    pub param_count: u8,
    pub returns_value: bool,
}

impl MethodSig {
    /// Signature of a static method.
    pub fn static_method(param_count: u8, returns_value: bool) -> Self {
        MethodSig {
            has_this: false,
            param_count,
            returns_value,
        }
    }

    /// Signature of an instance method.
    pub fn instance_method(param_count: u8, returns_value: bool) -> Self {
        MethodSig {
            has_this: true,
            param_count,
            returns_value,
        }
    }

    /// Values a call pops off the stack.
    pub fn stack_inputs(&self) -> u32 {
        u32::from(self.param_count) + u32::from(self.has_this)
    }
}

/// Method attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodFlags(u16);

impl MethodFlags {
    pub const STATIC: MethodFlags = MethodFlags(0x0001);
    pub const ABSTRACT: MethodFlags = MethodFlags(0x0002);
    pub const EXTERNAL: MethodFlags = MethodFlags(0x0004);
    pub const SPECIAL_NAME: MethodFlags = MethodFlags(0x0008);

    const KNOWN: u16 = 0x000f;

    pub fn empty() -> Self {
        MethodFlags(0)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    /// Rebuild flags from their encoded form, rejecting unknown bits.
    pub fn from_bits(bits: u16) -> Option<Self> {
        (bits & !Self::KNOWN == 0).then_some(MethodFlags(bits))
    }

    pub fn contains(self, other: MethodFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MethodFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: MethodFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for MethodFlags {
    type Output = MethodFlags;

    fn bitor(self, rhs: MethodFlags) -> MethodFlags {
        MethodFlags(self.0 | rhs.0)
    }
}

/// Reference to a method callable from this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodToken {
    /// A method defined in this module
    Def { type_index: u32, method_index: u32 },
    /// An entry of the member-reference table
    Ref(u32),
}

impl fmt::Display for MethodToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodToken::Def {
                type_index,
                method_index,
            } => write!(f, "def[{}:{}]", type_index, method_index),
            MethodToken::Ref(index) => write!(f, "ref[{}]", index),
        }
    }
}

/// A method in another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Index into [`Module::module_refs`]
    pub module: u32,
    pub type_name: String,
    pub method_name: String,
    pub sig: MethodSig,
}

/// Reference to a type, either local or in another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// `None` for this module, otherwise an index into [`Module::module_refs`]
    pub scope: Option<u32>,
    pub full_name: String,
}

impl TypeRef {
    /// A type declared in the same module.
    pub fn local(full_name: impl Into<String>) -> Self {
        TypeRef {
            scope: None,
            full_name: full_name.into(),
        }
    }

    /// A type declared in a referenced module.
    pub fn external(scope: u32, full_name: impl Into<String>) -> Self {
        TypeRef {
            scope: Some(scope),
            full_name: full_name.into(),
        }
    }
}

/// A zero-argument annotation on a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomAttribute {
    pub attribute_type: TypeRef,
}

impl CustomAttribute {
    pub fn new(attribute_type: TypeRef) -> Self {
        CustomAttribute { attribute_type }
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub flags: MethodFlags,
    pub sig: MethodSig,
    pub attributes: Vec<CustomAttribute>,
    /// `None` for abstract and external methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Whether the method has at least one instruction.
    pub fn has_instructions(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_empty())
    }

    /// Number of instructions, zero without a body.
    pub fn instruction_count(&self) -> usize {
        self.body.as_ref().map_or(0, MethodBody::len)
    }
}

/// A type definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Namespace-qualified name, e.g. `Game.Player`
    pub full_name: String,
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(full_name: impl Into<String>) -> Self {
        TypeDef {
            full_name: full_name.into(),
            methods: Vec::new(),
        }
    }

    /// Simple name without namespace.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    /// Namespace, empty for the global namespace.
    pub fn namespace(&self) -> &str {
        self.full_name.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    /// Find a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A compiled module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,

    /// Names of referenced external modules
    pub module_refs: Vec<String>,

    /// Methods imported from external modules
    pub member_refs: Vec<MemberRef>,

    pub types: Vec<TypeDef>,

    /// Debug symbols, when they were loaded
    pub symbols: Option<SymbolData>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            module_refs: Vec::new(),
            member_refs: Vec::new(),
            types: Vec::new(),
            symbols: None,
        }
    }

    /// Find a type by full name.
    pub fn type_by_name(&self, full_name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.full_name == full_name)
    }

    /// Index of a referenced module, adding it if needed.
    pub fn module_ref(&mut self, name: &str) -> u32 {
        if let Some(index) = self.module_refs.iter().position(|m| m == name) {
            return index as u32;
        }
        self.module_refs.push(name.to_string());
        (self.module_refs.len() - 1) as u32
    }

    /// Name of the module a member reference points into.
    pub fn member_ref_module(&self, member: &MemberRef) -> Option<&str> {
        self.module_refs
            .get(member.module as usize)
            .map(String::as_str)
    }

    /// Import an external method and return a token to call it.
    ///
    /// Importing the same method twice returns the existing entry.
    pub fn import_method(
        &mut self,
        module: &str,
        type_name: &str,
        method_name: &str,
        sig: MethodSig,
    ) -> MethodToken {
        let module = self.module_ref(module);
        let member = MemberRef {
            module,
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
            sig,
        };

        if let Some(index) = self.member_refs.iter().position(|m| *m == member) {
            return MethodToken::Ref(index as u32);
        }
        self.member_refs.push(member);
        MethodToken::Ref((self.member_refs.len() - 1) as u32)
    }

    /// Signature of the method a token refers to.
    pub fn method_sig(&self, token: MethodToken) -> Option<MethodSig> {
        match token {
            MethodToken::Def {
                type_index,
                method_index,
            } => self
                .types
                .get(type_index as usize)?
                .methods
                .get(method_index as usize)
                .map(|m| m.sig),
            MethodToken::Ref(index) => self.member_refs.get(index as usize).map(|m| m.sig),
        }
    }

    /// Human-readable name of the method a token refers to.
    pub fn method_display_name(&self, token: MethodToken) -> Option<String> {
        match token {
            MethodToken::Def {
                type_index,
                method_index,
            } => {
                let ty = self.types.get(type_index as usize)?;
                let method = ty.methods.get(method_index as usize)?;
                Some(format!("{}::{}", ty.full_name, method.name))
            }
            MethodToken::Ref(index) => {
                let member = self.member_refs.get(index as usize)?;
                let module = self.member_ref_module(member)?;
                Some(format!(
                    "[{}]{}::{}",
                    module, member.type_name, member.method_name
                ))
            }
        }
    }

    /// Iterate every method with its declaring type.
    pub fn methods(&self) -> impl Iterator<Item = (&TypeDef, &MethodDef)> + '_ {
        self.types
            .iter()
            .flat_map(|ty| ty.methods.iter().map(move |m| (ty, m)))
    }
}
