//! x4-catalog binary entry point.
//!
//! Thin wrapper around the x4-catalog-cli library that initializes logging,
//! parses the command line and runs the requested command.

use anyhow::Result;
use clap::Parser;
use x4_catalog_cli::Cli;

fn main() -> Result<()> {
    // Logs go to stderr so `cat` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    x4_catalog_cli::run(&cli, &mut out)
}
