use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cmdsync_log_extract::CommandCatalog;

/// Extract canonical command documents from a directory of execution logs.
///
/// Walks `log_dir` for `*.pytestlog.json` files and writes one canonical
/// document per script into `out_dir`, fixture logs merged as `conftest.py`.
#[derive(Parser)]
#[command(name = "cmdsync-extract")]
#[command(version)]
struct Cli {
    /// Directory containing *.pytestlog.json execution logs
    log_dir: PathBuf,

    /// Directory to write the canonical documents into
    out_dir: PathBuf,

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
    let catalog = CommandCatalog::refresh(&cli.log_dir)
        .with_context(|| format!("scanning {}", cli.log_dir.display()))?;
    if catalog.is_empty() {
        log::warn!("no execution logs found under {}", cli.log_dir.display());
        return Ok(());
    }

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    for (script, text) in catalog.iter() {
        let path = cli.out_dir.join(script);
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}
