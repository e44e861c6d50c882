// ABOUTME: Entry point for the ssh-keysign binary.
// ABOUTME: Parses flags, starts the async runtime and exits with the command's status code.

use anyhow::{Context, Result};
use clap::Parser;
use keysign_cli::args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let code = runtime.block_on(keysign_cli::run(cli));

    drop(runtime);
    std::process::exit(code);
}
