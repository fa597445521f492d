//! External reference resolution.
//!
//! A module calls into other modules by name. The resolver turns such a name
//! into a loaded [`Module`] by searching an ordered list of directories, and
//! checks that a referenced method really exists there.

pub mod errors;
pub mod search;

pub use errors::ResolutionError;
pub use search::{SearchDirectories, SearchPathResolver};

use std::fmt;
use std::sync::Arc;

use crate::core::{MemberRef, MethodSig, Module};

/// A method expected to exist in an external module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodTarget {
    pub module: String,
    pub type_name: String,
    pub method_name: String,
    pub param_count: u8,
    /// Whether the method must be static
    pub is_static: bool,
}

impl MethodTarget {
    /// Target of a member reference of `owner`.
    pub fn from_member_ref(owner: &Module, member: &MemberRef) -> Option<Self> {
        Some(MethodTarget {
            module: owner.member_ref_module(member)?.to_string(),
            type_name: member.type_name.clone(),
            method_name: member.method_name.clone(),
            param_count: member.sig.param_count,
            is_static: !member.sig.has_this,
        })
    }
}

impl fmt::Display for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({} params)",
            self.type_name, self.method_name, self.param_count
        )
    }
}

/// Locates external modules and their methods.
pub trait Resolve {
    /// Load the module with the given name.
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, ResolutionError>;

    /// Check that `target` exists and return its signature.
    fn resolve_method(&mut self, target: &MethodTarget) -> Result<MethodSig, ResolutionError> {
        let module = self.resolve(&target.module)?;
        find_method(&module, target)
    }
}

/// Find `target` in an already loaded module.
pub fn find_method(module: &Module, target: &MethodTarget) -> Result<MethodSig, ResolutionError> {
    let not_found = |reason: String| ResolutionError::MemberNotFound {
        module: target.module.clone(),
        member: format!("{}::{}", target.type_name, target.method_name),
        reason,
    };

    let ty = module
        .type_by_name(&target.type_name)
        .ok_or_else(|| not_found(format!("type `{}` does not exist", target.type_name)))?;

    let mut candidates = ty
        .methods
        .iter()
        .filter(|m| m.name == target.method_name)
        .peekable();
    if candidates.peek().is_none() {
        return Err(not_found(format!(
            "type `{}` declares no method named `{}`",
            target.type_name, target.method_name
        )));
    }

    candidates
        .find(|m| m.sig.param_count == target.param_count && m.sig.has_this != target.is_static)
        .map(|m| m.sig)
        .ok_or_else(|| {
            not_found(format!(
                "no {} overload takes {} parameter(s)",
                if target.is_static { "static" } else { "instance" },
                target.param_count
            ))
        })
}
