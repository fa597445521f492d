//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ilweave::codec;
use ilweave::core::{
    Instruction, MethodBuilder, Module, ModuleBuilder, OpCode, SequencePoint, SymbolData,
    SymbolFormat, TypeBuilder,
};

/// `Game` with a marked three-instruction `Game.Player.Update` and an
/// unmarked `Game.Player.Reset`.
pub fn game_module() -> Module {
    ModuleBuilder::new("Game")
        .ty(TypeBuilder::new("Game.Player")
            .method(
                MethodBuilder::new("Update")
                    .instance()
                    .attribute("LogAttribute")
                    .instrs([
                        Instruction::ldc_i4(1),
                        Instruction::simple(OpCode::Pop),
                        Instruction::ret(),
                    ]),
            )
            .method(MethodBuilder::new("Reset").instance().instrs([
                Instruction::ldc_i4(0),
                Instruction::stloc(0),
                Instruction::ret(),
            ])))
        .build()
}

/// [`game_module`] with sequence points on `Update`.
pub fn game_module_with_symbols() -> Module {
    let mut module = game_module();
    let mut symbols = SymbolData::new(SymbolFormat::Pdb);
    let document = symbols.document_index("Assets/Player.cs");

    if let Some(body) = module.types[0].methods[0].body.as_mut() {
        let ids = body.ids().to_vec();
        body.sequence_points.push(SequencePoint {
            instruction: ids[0],
            document,
            line: 10,
            column: 9,
        });
    }

    module.symbols = Some(symbols);
    module
}

/// A module with nothing marked.
pub fn plain_module(name: &str) -> Module {
    ModuleBuilder::new(name)
        .ty(TypeBuilder::new(format!("{}.Tools", name))
            .method(MethodBuilder::new("Run").instr(Instruction::ret())))
        .build()
}

/// `UnityEngine` declaring `UnityEngine.Debug.Log(object)`.
pub fn sink_module() -> Module {
    ModuleBuilder::new("UnityEngine")
        .ty(TypeBuilder::new("UnityEngine.Debug")
            .method(MethodBuilder::new("Log").params(1).external()))
        .build()
}

/// Write `module` to `<dir>/<name>.dll`.
pub fn write_module(dir: &Path, module: &Module) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.dll", module.name));
    std::fs::write(&path, codec::encode_module(module).unwrap()).unwrap();
    path
}

/// Instruction listing of `Type.Method` in the module at `path`.
pub fn listing(path: &Path, type_name: &str, method: &str) -> Vec<String> {
    let module = codec::read_module_shallow(path).unwrap();
    module
        .type_by_name(type_name)
        .and_then(|t| t.method(method))
        .and_then(|m| m.body.as_ref())
        .map(|b| b.instructions().map(|i| i.to_string()).collect())
        .unwrap_or_default()
}
