//! Entry/exit trace weaving.
//!
//! For every method carrying the marker attribute, [`weave`] inserts
//!
//! ```text
//! ldstr "Enter <Type>.<Method>"
//! call  <sink>
//! ```
//!
//! before the first instruction and the matching `Exit` pair before the last
//! one, then removes the marker so a second run finds nothing to do. The
//! original instructions keep their ids, so jumps and exception handlers that
//! target them are unaffected.

pub mod marker;
pub mod sink;

pub use marker::{MarkerMatcher, DEFAULT_MARKER};
pub use sink::{LogSink, SinkCache};

use serde::Serialize;

use crate::core::{Instruction, MethodBody, MethodToken, Module};
use crate::resolver::{Resolve, ResolutionError};

/// What to look for and where woven calls go.
#[derive(Debug, Clone, Default)]
pub struct WeaveOptions {
    pub marker: MarkerMatcher,
    pub sink: LogSink,
}

/// A method that received trace calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WovenMethod {
    pub type_name: String,
    pub method_name: String,
}

impl WovenMethod {
    /// `Type.Method`, as it appears in the trace messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.type_name, self.method_name)
    }
}

/// Outcome of weaving one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    pub woven: Vec<WovenMethod>,

    /// Marked methods left alone because they have no instructions
    pub skipped: Vec<WovenMethod>,
}

impl WeaveReport {
    /// Whether the module changed and needs to be written.
    pub fn mutated(&self) -> bool {
        !self.woven.is_empty()
    }
}

/// Weave every marked method of `module`.
///
/// The sink is resolved the first time it is needed and reused for the rest
/// of the module. A resolution failure leaves the module unchanged.
pub fn weave(
    module: &mut Module,
    resolver: &mut dyn Resolve,
    options: &WeaveOptions,
) -> Result<WeaveReport, ResolutionError> {
    let mut report = WeaveReport::default();
    let mut cache = SinkCache::new();

    for t in 0..module.types.len() {
        tracing::debug!("processing type `{}`", module.types[t].full_name);

        for m in 0..module.types[t].methods.len() {
            let ty = &module.types[t];
            let method = &ty.methods[m];

            let Some(marker) = options.marker.find(module, method) else {
                continue;
            };
            let entry = WovenMethod {
                type_name: ty.full_name.clone(),
                method_name: method.name.clone(),
            };

            if !method.has_instructions() {
                tracing::debug!(
                    "`{}` is marked but has no body, skipping",
                    entry.qualified_name()
                );
                report.skipped.push(entry);
                continue;
            }

            let token = cache.get_or_import(module, &options.sink, resolver)?;

            let method = &mut module.types[t].methods[m];
            if let Some(body) = method.body.as_mut() {
                inject(body, &entry.qualified_name(), token);
            }
            method.attributes.remove(marker);

            tracing::debug!("wove `{}`", entry.qualified_name());
            report.woven.push(entry);
        }
    }

    Ok(report)
}

/// Insert the entry pair at the start and the exit pair before the last
/// instruction. `body` must not be empty.
///
/// Region bounds keep their instruction ids, so a try or handler region that
/// ends at the last instruction grows to cover the exit pair, while the entry
/// pair stays ahead of a region starting at the first one.
fn inject(body: &mut MethodBody, name: &str, sink: MethodToken) {
    body.insert_at(0, Instruction::ldstr(format!("Enter {}", name)));
    body.insert_at(1, Instruction::call(sink));

    let last = body.len() - 1;
    body.insert_at(last, Instruction::ldstr(format!("Exit {}", name)));
    body.insert_at(last + 1, Instruction::call(sink));
}
