//! ilweave CLI - Attribute-driven trace weaving for bytecode modules

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for JSON and disassembly
    let filter = if cli.global.verbose {
        EnvFilter::new("ilweave=debug")
    } else if cli.global.quiet {
        EnvFilter::new("ilweave=error")
    } else {
        EnvFilter::new("ilweave=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::Weave(args) => commands::weave::execute(args, cli.global),
        Commands::Inspect(args) => commands::inspect::execute(args, cli.global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
