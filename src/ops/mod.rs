//! High-level operations.
//!
//! This module contains the implementation of ilweave commands.

pub mod discover;
pub mod host;
pub mod inspect;
pub mod weave_batch;

pub use discover::{collect_search_dirs, discover_modules, expand_includes, RUNTIME_DIR_ENV};
pub use host::{run_session, HostSession, LockFileSession, NoopSession, SessionGuard};
pub use inspect::{disassemble, read_for_inspection, summarize, ModuleSummary};
pub use weave_batch::{
    run_batch, weave_modules, BatchOptions, BatchReport, ModuleError, ModuleOutcome, ModuleStatus,
};
