//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ilweave::ops::RUNTIME_DIR_ENV;
use ilweave::util::shell::ColorChoice;

/// ilweave - Attribute-driven entry/exit trace weaving for bytecode modules
#[derive(Parser)]
#[command(name = "ilweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Clone, Copy)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Weave trace calls into marked methods
    Weave(WeaveArgs),

    /// Show the types, methods and code of a module
    Inspect(InspectArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct WeaveArgs {
    /// Module files or directories to weave (defaults to `include` in ilweave.toml)
    pub paths: Vec<PathBuf>,

    /// Extra directory to search for referenced modules
    #[arg(long = "search-dir", value_name = "DIR")]
    pub search_dirs: Vec<PathBuf>,

    /// Directory holding the host's runtime modules
    #[arg(long, value_name = "DIR", env = RUNTIME_DIR_ENV)]
    pub runtime_dir: Option<PathBuf>,

    /// Full name of the marker attribute
    #[arg(long, value_name = "NAME")]
    pub marker: Option<String>,

    /// Weave without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON events on stdout
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 when any module failed
    #[arg(long)]
    pub strict: bool,

    /// Don't take the project lock file
    #[arg(long)]
    pub no_lock: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Module file to inspect
    pub module: PathBuf,

    /// Print a JSON summary instead of the disassembly
    #[arg(long)]
    pub json: bool,

    /// Full name of the marker attribute
    #[arg(long, value_name = "NAME")]
    pub marker: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
