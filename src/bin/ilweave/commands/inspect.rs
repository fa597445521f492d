//! `ilweave inspect` command

use anyhow::{bail, Result};

use crate::cli::{GlobalArgs, InspectArgs};
use ilweave::ops::{disassemble, read_for_inspection, summarize};
use ilweave::util::shell::Shell;
use ilweave::util::GlobalContext;
use ilweave::weaver::MarkerMatcher;

pub fn execute(args: InspectArgs, global: GlobalArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let config = ctx.load_config();
    let shell = Shell::from_flags(global.quiet, global.verbose, global.color, false);

    let module = match read_for_inspection(&args.module) {
        Ok(module) => module,
        Err(e) => {
            shell.diagnostic(&e.to_diagnostic());
            bail!("could not inspect {}", args.module.display());
        }
    };

    let mut marker = config.weave_options().marker;
    if let Some(name) = args.marker {
        marker = MarkerMatcher {
            full_name: name,
            ..marker
        };
    }
    let summary = summarize(&module, &args.module, &marker);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print!("{}", disassemble(&module));
    shell.note(format!(
        "{} marked methods would be woven",
        summary.marked()
    ));
    Ok(())
}
