use anyhow::Context;
use clap::Parser;
use medlyn_g1::cli::{run, Cli};
use std::fs::File;
use std::sync::Mutex;
use tracing::Level;

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    run(cli).context("medlyn-g1 failed")
}
