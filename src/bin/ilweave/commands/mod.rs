//! Command implementations

pub mod completions;
pub mod inspect;
pub mod weave;
