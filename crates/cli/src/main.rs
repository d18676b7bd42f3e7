use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod generate;
mod orchestrator;

/// Write command-level edits back into a test script.
///
/// Compares two canonical command documents and rewrites only the script
/// functions whose commands changed; everything else in the script keeps its
/// exact bytes.
#[derive(Parser)]
#[command(name = "cmdsync")]
#[command(about = "Round-trip device commands between execution logs and test scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Test script to rewrite
    script: PathBuf,

    /// Canonical command document before modification
    old_commands: PathBuf,

    /// Canonical command document after modification
    new_commands: PathBuf,

    /// Optional device/topology mapping file, copied into the revert directory
    mapping: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    for path in [&cli.script, &cli.old_commands, &cli.new_commands] {
        anyhow::ensure!(path.is_file(), "input file not found: {}", path.display());
    }
    if let Some(mapping) = &cli.mapping {
        if !mapping.is_file() {
            log::warn!(
                "mapping file not found: {}, continuing without it",
                mapping.display()
            );
        }
    }

    let updated = orchestrator::write_back(
        &cli.script,
        &cli.old_commands,
        &cli.new_commands,
        cli.mapping.as_deref(),
    )?;
    if updated == 0 {
        log::info!("no command differences, script untouched");
    } else {
        log::info!("updated {updated} function(s) in {}", cli.script.display());
    }
    Ok(())
}
