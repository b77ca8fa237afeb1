//! Eitri agent CLI application
//!
//! This module provides the command-line interface for the Eitri agent.

use eitri_agent::cli::{commands, parse_cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_cli();

    match cli.command {
        Commands::Start => commands::start().await?,
    }
    Ok(())
}
