//! `ilweave weave` command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::cli::{GlobalArgs, WeaveArgs};
use ilweave::ops::{
    collect_search_dirs, discover_modules, expand_includes, run_session, weave_modules,
    BatchOptions, HostSession, LockFileSession, NoopSession,
};
use ilweave::util::shell::{Shell, Status};
use ilweave::util::GlobalContext;
use ilweave::weaver::MarkerMatcher;

/// Exit status when `--strict` is given and a module failed.
const STRICT_FAILURE: i32 = 2;

pub fn execute(args: WeaveArgs, global: GlobalArgs) -> Result<()> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(global.verbose);

    // Load configuration (global + project)
    let config = ctx.load_config();
    let root = ctx.project_root();
    let extensions = config.module_extensions();

    let candidates = if !args.paths.is_empty() {
        discover_modules(&args.paths, &extensions)?
    } else if !config.paths.include.is_empty() {
        expand_includes(&root, &config.paths.include)?
    } else {
        bail!("no modules to weave; pass module paths or set `include` under [paths] in ilweave.toml");
    };

    let shell = Arc::new(Shell::from_flags(
        global.quiet,
        global.verbose,
        global.color,
        args.json,
    ));

    if candidates.is_empty() {
        shell.warn("no modules found");
        return Ok(());
    }

    // Search directories: CLI first, then config
    let mut extra: Vec<PathBuf> = args.search_dirs.iter().map(|d| ctx.resolve_path(d)).collect();
    extra.extend(config.paths.search_dirs.iter().cloned());
    let runtime_dir = args
        .runtime_dir
        .as_ref()
        .map(|d| ctx.resolve_path(d))
        .or_else(|| config.paths.runtime_dir.clone());
    let dirs = collect_search_dirs(&candidates, &extra, runtime_dir.as_deref());

    let mut weave = config.weave_options();
    if let Some(marker) = args.marker {
        weave.marker = MarkerMatcher {
            full_name: marker,
            ..weave.marker
        };
    }
    let options = BatchOptions {
        weave,
        dry_run: args.dry_run || config.weave.dry_run,
        ..BatchOptions::default()
    };

    let mut host: Box<dyn HostSession> = if args.no_lock || options.dry_run {
        Box::new(NoopSession)
    } else {
        Box::new(LockFileSession::new(&root))
    };

    let span = shell.span(
        Status::Weaving,
        format!("{} modules", candidates.len()),
    );
    let report = run_session(host.as_mut(), || {
        weave_modules(&candidates, dirs, extensions, &options, &shell)
    })?;

    let Some(report) = report else {
        shell.warn("weaving aborted; remaining modules were left as they were");
        return Ok(());
    };

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "weave-finished",
            "modules": report.modules.len(),
            "woven": report.woven(),
            "written": report.written(),
            "unchanged": report.unchanged(),
            "failed": report.failed(),
            "methods": report.methods(),
            "dry_run": options.dry_run,
        }));
    } else {
        let mut summary = format!(
            "{} methods in {} of {} modules",
            report.methods(),
            report.woven(),
            report.modules.len()
        );
        if report.failed() > 0 {
            summary.push_str(&format!(", {} failed", report.failed()));
        }
        if options.dry_run {
            summary.push_str(" (dry run)");
        }
        span.finish_with_message(summary);
    }

    if args.strict && report.has_failures() {
        std::process::exit(STRICT_FAILURE);
    }

    Ok(())
}
