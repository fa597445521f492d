//! Test fixtures for common test scenarios.
//!
//! Sample modules shaped like a small game project and the engine module
//! that provides the logging sink.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec;
use crate::core::{
    Instruction, MethodBuilder, Module, ModuleBuilder, OpCode, SequencePoint, SymbolData,
    SymbolFormat, TypeBuilder,
};
use crate::resolver::{Resolve, ResolutionError};

/// `Game` with `Game.Player.Update` marked for weaving (three instructions)
/// and an unmarked `Game.Player.Reset`.
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
        body.sequence_points.push(SequencePoint {
            instruction: ids[2],
            document,
            line: 11,
            column: 5,
        });
    }

    module.symbols = Some(symbols);
    module
}

/// `UnityEngine` declaring `UnityEngine.Debug.Log(object)`.
pub fn sink_module() -> Module {
    ModuleBuilder::new("UnityEngine")
        .ty(TypeBuilder::new("UnityEngine.Debug")
            .method(MethodBuilder::new("Log").params(1).external())
            .method(MethodBuilder::new("LogWarning").params(1).external()))
        .build()
}

/// Write `module` to `<dir>/<name>.dll` and return the path.
pub fn write_module(dir: &Path, module: &Module) -> PathBuf {
    let path = dir.join(format!("{}.dll", module.name));
    let bytes = codec::encode_module(module).expect("fixture module encodes");
    std::fs::write(&path, bytes).expect("fixture module written");
    path
}

/// In-memory resolver counting module lookups.
#[derive(Debug, Default)]
pub struct MapResolver {
    modules: HashMap<String, Arc<Module>>,
    lookups: usize,
}

impl MapResolver {
    /// A resolver that knows [`sink_module`].
    pub fn with_sink() -> Self {
        let mut resolver = MapResolver::default();
        resolver.insert(sink_module());
        resolver
    }

    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), Arc::new(module));
    }

    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

impl Resolve for MapResolver {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, ResolutionError> {
        self.lookups += 1;
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound {
                name: name.to_string(),
                searched: Vec::new(),
            })
    }
}
