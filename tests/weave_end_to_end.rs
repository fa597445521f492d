//! End-to-end weaving through the library: discover, resolve, read, weave,
//! write and read back.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use common::{
    game_module, game_module_with_symbols, listing, plain_module, sink_module, write_module,
};
use ilweave::codec::{self, ReadMode, ReaderParameters, WriteError};
use ilweave::core::{
    ExceptionHandler, HandlerKind, InstrId, Instruction, MethodBody, MethodBuilder,
    ModuleBuilder, OpCode, Operand, SequencePoint, SymbolData, SymbolFormat, TypeBuilder,
};
use ilweave::ops::{collect_search_dirs, weave_modules, BatchOptions, ModuleStatus};
use ilweave::resolver::{Resolve, SearchDirectories, SearchPathResolver};
use ilweave::symbols::{self, SymbolConfig, SymbolSource};
use ilweave::util::shell::Shell;

fn shell() -> Arc<Shell> {
    Arc::new(Shell::quiet())
}

fn extensions() -> Vec<String> {
    vec!["dll".to_string(), "exe".to_string()]
}

fn run(candidates: &[PathBuf], extra: &[PathBuf]) -> ilweave::ops::BatchReport {
    let dirs = collect_search_dirs(candidates, extra, None);
    weave_modules(candidates, dirs, extensions(), &BatchOptions::default(), &shell())
}

#[test]
fn test_marked_method_gains_entry_and_exit_calls() {
    let tmp = TempDir::new().unwrap();
    let game = write_module(tmp.path(), &game_module());
    write_module(tmp.path(), &sink_module());

    let report = run(&[game.clone()], &[]);

    assert_eq!(report.written(), 1);
    assert_eq!(
        listing(&game, "Game.Player", "Update"),
        vec![
            "ldstr \"Enter Game.Player.Update\"",
            "call ref[0]",
            "ldc.i4 1",
            "pop",
            "ldstr \"Exit Game.Player.Update\"",
            "call ref[0]",
            "ret",
        ]
    );
    assert_eq!(
        listing(&game, "Game.Player", "Reset"),
        vec!["ldc.i4 0", "stloc loc.0", "ret"]
    );

    let module = codec::read_module_shallow(&game).unwrap();
    assert!(module.types[0].methods[0].attributes.is_empty());
    assert_eq!(module.module_refs, vec!["UnityEngine".to_string()]);
}

#[test]
fn test_woven_module_passes_full_read() {
    let tmp = TempDir::new().unwrap();
    let game = write_module(tmp.path(), &game_module());
    write_module(tmp.path(), &sink_module());
    run(&[game.clone()], &[]);

    let mut resolver = SearchPathResolver::new(SearchDirectories::from_iter([tmp.path()]));
    let module = codec::read_module(&game, &mut resolver, &ReaderParameters::default()).unwrap();
    assert_eq!(module.member_refs.len(), 1);
}

#[test]
fn test_no_marked_methods_means_no_write() {
    let tmp = TempDir::new().unwrap();
    let tools = write_module(tmp.path(), &plain_module("Tools"));
    let before = fs::read(&tools).unwrap();
    let modified = fs::metadata(&tools).unwrap().modified().unwrap();

    let report = run(&[tools.clone()], &[]);

    assert_eq!(report.unchanged(), 1);
    assert_eq!(report.written(), 0);
    assert_eq!(fs::read(&tools).unwrap(), before);
    assert_eq!(fs::metadata(&tools).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_second_run_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let game = write_module(tmp.path(), &game_module());
    write_module(tmp.path(), &sink_module());

    run(&[game.clone()], &[]);
    let once = fs::read(&game).unwrap();

    let report = run(&[game.clone()], &[]);

    assert_eq!(report.modules[0].status, ModuleStatus::Unchanged);
    assert_eq!(fs::read(&game).unwrap(), once);
}

#[test]
fn test_sink_found_only_in_second_directory() {
    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("Library");
    let engine = tmp.path().join("Engine");
    let game = write_module(&project, &game_module());
    let tools = write_module(&project, &plain_module("Tools"));
    write_module(&engine, &sink_module());
    let candidates = vec![game.clone(), tools.clone()];

    let without = run(&candidates, &[]);
    assert_eq!(without.failed(), 1);
    assert_eq!(without.unchanged(), 1);
    match &without.modules[0].status {
        ModuleStatus::Failed { error } => {
            assert!(error.contains("could not find module `UnityEngine`"))
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(listing(&game, "Game.Player", "Update").len(), 3);

    let with = run(&candidates, &[engine]);
    assert_eq!(with.failed(), 0);
    assert_eq!(with.written(), 1);
    assert_eq!(listing(&game, "Game.Player", "Update").len(), 7);
}

#[test]
fn test_first_search_directory_wins() {
    let tmp = TempDir::new().unwrap();
    let d1 = tmp.path().join("d1");
    let d2 = tmp.path().join("d2");
    write_module(&d1, &sink_module());
    write_module(&d2, &sink_module());

    let mut resolver = SearchPathResolver::new(SearchDirectories::from_iter([&d1, &d2]));
    let path = resolver.find_file("UnityEngine").unwrap();
    assert!(path.starts_with(d1.canonicalize().unwrap()));
    assert!(resolver.resolve("UnityEngine").is_ok());
}

#[test]
fn test_pdb_preferred_and_mdb_written() {
    let tmp = TempDir::new().unwrap();
    let module = game_module_with_symbols();
    let game = write_module(tmp.path(), &module);
    write_module(tmp.path(), &sink_module());
    fs::write(symbols::pdb_path(&game), symbols::pdb::encode(&module)).unwrap();
    // Garbage in the mdb slot; only the pdb may be read
    fs::write(symbols::canonical_path(&game), b"stale").unwrap();

    let config = SymbolConfig::detect(&game);
    assert_eq!(config.read.as_ref().unwrap().format, SymbolFormat::Pdb);
    assert_eq!(config.write, Some(symbols::canonical_path(&game)));

    let report = run(&[game.clone()], &[]);
    assert_eq!(report.written(), 1);

    let params = ReaderParameters {
        mode: ReadMode::Shallow,
        symbols: SymbolConfig {
            read: Some(SymbolSource {
                format: SymbolFormat::Mdb,
                path: symbols::canonical_path(&game),
            }),
            write: None,
        },
    };
    let mut resolver = SearchPathResolver::new(SearchDirectories::new());
    let reread = codec::read_module(&game, &mut resolver, &params).unwrap();

    let body = reread.types[0].methods[0].body.as_ref().unwrap();
    assert_eq!(body.sequence_points.len(), 1);
    // The point stays on `ldc.i4 1`, now behind the entry pair
    assert_eq!(body.position(body.sequence_points[0].instruction), Some(2));
    assert_eq!(reread.symbols.unwrap().documents, vec!["Assets/Player.cs"]);
}

#[test]
fn test_branches_and_handlers_survive_weaving() {
    let tmp = TempDir::new().unwrap();
    let mut body = MethodBody::new();
    let try_start = body.push(Instruction::ldc_i4(1));
    let ret = body.push(Instruction::ret());
    body.insert_before(ret, Instruction::branch(OpCode::BrFalse, ret))
        .unwrap();
    let finally = body
        .insert_before(ret, Instruction::simple(OpCode::EndFinally))
        .unwrap();
    body.handlers.push(ExceptionHandler {
        kind: HandlerKind::Finally,
        try_start,
        try_end: Some(finally),
        handler_start: finally,
        handler_end: Some(ret),
        catch_type: None,
    });
    let module = ModuleBuilder::new("Flow")
        .ty(TypeBuilder::new("Flow.Door").method(
            MethodBuilder::new("Open").attribute("LogAttribute").body(body),
        ))
        .build();
    let flow = write_module(tmp.path(), &module);
    write_module(tmp.path(), &sink_module());

    run(&[flow.clone()], &[]);

    let reread = codec::read_module_shallow(&flow).unwrap();
    let body = reread.types[0].methods[0].body.as_ref().unwrap();
    let ids = body.ids();

    // Enter pair, ldc, brfalse, endfinally, Exit pair, ret
    assert_eq!(body.len(), 8);
    assert_eq!(body.get(ids[3]).unwrap().operand, Operand::Branch(ids[7]));
    assert_eq!(body.handlers[0].try_start, ids[2]);
    assert_eq!(body.handlers[0].handler_start, ids[4]);
    assert_eq!(body.handlers[0].handler_end, Some(ids[7]));
    assert!(body.validate().is_ok());
}

#[cfg(unix)]
#[test]
fn test_weaving_keeps_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let game = write_module(tmp.path(), &game_module());
    write_module(tmp.path(), &sink_module());
    fs::set_permissions(&game, fs::Permissions::from_mode(0o755)).unwrap();

    let report = run(&[game.clone()], &[]);

    assert_eq!(report.written(), 1);
    let mode = fs::metadata(&game).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_overloads_survive_symbol_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut module = ModuleBuilder::new("Game")
        .ty(TypeBuilder::new("Game.P")
            .method(MethodBuilder::new("Foo").params(1).instr(Instruction::ret()))
            .method(MethodBuilder::new("Foo").params(1).instrs([
                Instruction::nop(),
                Instruction::nop(),
                Instruction::ret(),
            ])))
        .build();
    let mut data = SymbolData::new(SymbolFormat::Mdb);
    let document = data.document_index("Assets/P.cs");
    let body = module.types[0].methods[1].body.as_mut().unwrap();
    let ret = body.last().unwrap();
    body.sequence_points.push(SequencePoint {
        instruction: ret,
        document,
        line: 20,
        column: 1,
    });
    module.symbols = Some(data);

    let path = tmp.path().join("Game.dll");
    let mdb = symbols::canonical_path(&path);
    let config = SymbolConfig {
        read: None,
        write: Some(mdb.clone()),
    };
    codec::write_module(&module, &path, &config).unwrap();

    let params = ReaderParameters {
        mode: ReadMode::Shallow,
        symbols: SymbolConfig {
            read: Some(SymbolSource {
                format: SymbolFormat::Mdb,
                path: mdb,
            }),
            write: None,
        },
    };
    let mut resolver = SearchPathResolver::new(SearchDirectories::new());
    let reread = codec::read_module(&path, &mut resolver, &params).unwrap();

    let methods = &reread.types[0].methods;
    assert!(methods[0].body.as_ref().unwrap().sequence_points.is_empty());
    let body = methods[1].body.as_ref().unwrap();
    assert_eq!(body.sequence_points.len(), 1);
    assert_eq!(body.position(body.sequence_points[0].instruction), Some(2));
}

#[test]
fn test_failed_write_leaves_original_bytes() {
    let tmp = TempDir::new().unwrap();
    let game = write_module(tmp.path(), &game_module());
    let before = fs::read(&game).unwrap();

    // A branch to an instruction outside the body cannot be encoded
    let mut broken = game_module();
    let body = broken.types[0].methods[0].body.as_mut().unwrap();
    let ret = body.last().unwrap();
    body.insert_before(ret, Instruction::branch(OpCode::Br, InstrId::default()))
        .unwrap();

    let err = codec::write_module(&broken, &game, &SymbolConfig::none()).unwrap_err();

    assert!(matches!(err, WriteError::Invalid { .. }));
    assert_eq!(fs::read(&game).unwrap(), before);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}
