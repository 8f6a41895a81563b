//! # Repository Sync Entry Point
//!
//! Thin wrapper around the library: parses the command line, loads
//! configuration and dispatches to the selected command.

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli.execute().await
}
