//! Marker attribute matching.

use crate::core::{CustomAttribute, MethodDef, Module};

/// Full name of the default marker attribute.
pub const DEFAULT_MARKER: &str = "LogAttribute";

/// Decides which custom attribute marks a method for weaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatcher {
    /// Attribute type full name, compared exactly
    pub full_name: String,

    /// When set, the attribute must be declared in this external module
    pub declaring_module: Option<String>,
}

impl Default for MarkerMatcher {
    fn default() -> Self {
        MarkerMatcher::new(DEFAULT_MARKER)
    }
}

impl MarkerMatcher {
    /// Match by full name only.
    pub fn new(full_name: impl Into<String>) -> Self {
        MarkerMatcher {
            full_name: full_name.into(),
            declaring_module: None,
        }
    }

    /// Also require the attribute to come from `module`.
    pub fn declared_in(mut self, module: impl Into<String>) -> Self {
        self.declaring_module = Some(module.into());
        self
    }

    /// Whether `attr`, attached to a method of `module`, is the marker.
    pub fn matches(&self, module: &Module, attr: &CustomAttribute) -> bool {
        let ty = &attr.attribute_type;
        if ty.full_name != self.full_name {
            return false;
        }
        match &self.declaring_module {
            None => true,
            Some(expected) => ty
                .scope
                .and_then(|scope| module.module_refs.get(scope as usize))
                .is_some_and(|name| name == expected),
        }
    }

    /// Index of the first marker on `method`.
    pub fn find(&self, module: &Module, method: &MethodDef) -> Option<usize> {
        method
            .attributes
            .iter()
            .position(|attr| self.matches(module, attr))
    }
}
