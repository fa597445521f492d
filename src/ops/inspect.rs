//! Module inspection: a JSON summary and a text disassembly.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::codec::{self, ReadError, ReadMode, ReaderParameters};
use crate::core::{
    InstrId, Instruction, MethodBody, MethodDef, MethodFlags, MethodToken, Module, Operand,
    TypeRef,
};
use crate::resolver::{SearchDirectories, SearchPathResolver};
use crate::symbols::SymbolConfig;
use crate::util::hash;
use crate::weaver::MarkerMatcher;

/// Machine-readable description of a module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub path: PathBuf,
    /// Short SHA256 of the module file
    pub fingerprint: Option<String>,
    pub module_refs: Vec<String>,
    pub member_refs: Vec<String>,
    /// Format of the symbols found next to the module
    pub symbols: Option<String>,
    pub types: Vec<TypeSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub name: String,
    pub methods: Vec<MethodSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub name: String,
    pub is_static: bool,
    pub params: u8,
    pub returns_value: bool,
    pub attributes: Vec<String>,
    pub instructions: usize,
    /// Carries the marker and would be woven
    pub marked: bool,
}

impl ModuleSummary {
    /// Number of methods that would be woven.
    pub fn marked(&self) -> usize {
        self.types
            .iter()
            .flat_map(|t| &t.methods)
            .filter(|m| m.marked && m.instructions > 0)
            .count()
    }
}

/// Read a module with its symbols without resolving any reference.
pub fn read_for_inspection(path: &Path) -> Result<Module, ReadError> {
    let params = ReaderParameters {
        mode: ReadMode::Shallow,
        symbols: SymbolConfig::detect(path),
    };
    let mut resolver = SearchPathResolver::new(SearchDirectories::new());
    codec::read_module(path, &mut resolver, &params)
}

/// Summarize `module`.
pub fn summarize(module: &Module, path: &Path, marker: &MarkerMatcher) -> ModuleSummary {
    ModuleSummary {
        name: module.name.clone(),
        path: path.to_path_buf(),
        fingerprint: hash::short_file_hash(path).ok(),
        module_refs: module.module_refs.clone(),
        member_refs: (0..module.member_refs.len())
            .filter_map(|i| module.method_display_name(MethodToken::Ref(i as u32)))
            .collect(),
        symbols: module.symbols.as_ref().map(|s| s.source_format.to_string()),
        types: module
            .types
            .iter()
            .map(|ty| TypeSummary {
                name: ty.full_name.clone(),
                methods: ty
                    .methods
                    .iter()
                    .map(|method| MethodSummary {
                        name: method.name.clone(),
                        is_static: method.flags.contains(MethodFlags::STATIC),
                        params: method.sig.param_count,
                        returns_value: method.sig.returns_value,
                        attributes: method
                            .attributes
                            .iter()
                            .map(|a| type_ref_name(module, &a.attribute_type))
                            .collect(),
                        instructions: method.instruction_count(),
                        marked: marker.find(module, method).is_some(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Disassemble `module` to text.
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();

    let _ = writeln!(out, ".module {}", module.name);
    for name in &module.module_refs {
        let _ = writeln!(out, ".ref {}", name);
    }
    if let Some(symbols) = &module.symbols {
        let _ = writeln!(out, ".symbols {}", symbols.source_format);
    }

    for ty in &module.types {
        let _ = writeln!(out, "\n.type {}", ty.full_name);
        for method in &ty.methods {
            write_method(&mut out, module, method);
        }
    }

    out
}

fn write_method(out: &mut String, module: &Module, method: &MethodDef) {
    for attr in &method.attributes {
        let _ = writeln!(out, "  [{}]", type_ref_name(module, &attr.attribute_type));
    }

    let mut modifiers = Vec::new();
    if method.flags.contains(MethodFlags::STATIC) {
        modifiers.push("static");
    }
    if method.flags.contains(MethodFlags::ABSTRACT) {
        modifiers.push("abstract");
    }
    if method.flags.contains(MethodFlags::EXTERNAL) {
        modifiers.push("extern");
    }
    if method.flags.contains(MethodFlags::SPECIAL_NAME) {
        modifiers.push("specialname");
    }
    let ret = if method.sig.returns_value { "value" } else { "void" };
    let _ = writeln!(
        out,
        "  .method {}{}{} {}({})",
        modifiers.join(" "),
        if modifiers.is_empty() { "" } else { " " },
        ret,
        method.name,
        method.sig.param_count
    );

    let Some(body) = &method.body else {
        return;
    };
    let _ = writeln!(out, "  {{");
    let _ = writeln!(
        out,
        "    .maxstack {}  .locals {}",
        body.max_stack, body.locals
    );

    let positions = body.positions();
    let lines: HashMap<InstrId, u32> = body
        .sequence_points
        .iter()
        .map(|p| (p.instruction, p.line))
        .collect();

    for (pos, (id, instruction)) in body.iter().enumerate() {
        let line = lines
            .get(&id)
            .map(|l| format!("  // line {}", l))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "    IL_{:04}: {}{}",
            pos,
            format_instruction(module, instruction, &positions),
            line
        );
    }

    write_handlers(out, body, &positions);
    let _ = writeln!(out, "  }}");
}

fn write_handlers(out: &mut String, body: &MethodBody, positions: &HashMap<InstrId, usize>) {
    let label = |id: Option<InstrId>| match id.and_then(|id| positions.get(&id)) {
        Some(pos) => format!("IL_{:04}", pos),
        None => "end".to_string(),
    };

    for handler in &body.handlers {
        let _ = writeln!(
            out,
            "    .try {} to {} {:?}{} {} to {}",
            label(Some(handler.try_start)),
            label(handler.try_end),
            handler.kind,
            handler
                .catch_type
                .as_ref()
                .map(|t| format!(" {}", t))
                .unwrap_or_default(),
            label(Some(handler.handler_start)),
            label(handler.handler_end),
        );
    }
}

fn format_instruction(
    module: &Module,
    instruction: &Instruction,
    positions: &HashMap<InstrId, usize>,
) -> String {
    let label = |id: &InstrId| match positions.get(id) {
        Some(pos) => format!("IL_{:04}", pos),
        None => "IL_????".to_string(),
    };

    match &instruction.operand {
        Operand::Method(token) => match module.method_display_name(*token) {
            Some(name) => format!("{} {}", instruction.opcode, name),
            None => instruction.to_string(),
        },
        Operand::Branch(target) => format!("{} {}", instruction.opcode, label(target)),
        Operand::Switch(targets) => format!(
            "{} ({})",
            instruction.opcode,
            targets.iter().map(label).collect::<Vec<_>>().join(", ")
        ),
        _ => instruction.to_string(),
    }
}

fn type_ref_name(module: &Module, ty: &TypeRef) -> String {
    match ty.scope.and_then(|s| module.module_refs.get(s as usize)) {
        Some(scope) => format!("[{}]{}", scope, ty.full_name),
        None => ty.full_name.clone(),
    }
}
