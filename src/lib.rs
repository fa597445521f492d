//! ilweave - Attribute-driven entry/exit trace weaving
//!
//! This crate provides the core library functionality for ilweave: the
//! module object model and its on-disk codec, debug symbol companions,
//! reference resolution over search directories, the method weaver and the
//! batch operations the `ilweave` binary drives.

pub mod codec;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod symbols;
pub mod util;
pub mod weaver;

/// Test utilities for ilweave unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides sample modules, an in-memory resolver and
/// temporary project layouts.
#[cfg(test)]
pub mod test_support;

pub use codec::{read_module, write_module, ReadError, WriteError};
pub use core::{Module, ModuleBuilder};
pub use resolver::{Resolve, ResolutionError, SearchDirectories, SearchPathResolver};
pub use symbols::SymbolConfig;
pub use util::context::GlobalContext;
pub use weaver::{weave, WeaveOptions, WeaveReport};
