pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// Eitri Agent CLI
///
/// This CLI provides commands to run the Eitri agent, which subscribes to
/// the Eitri server's release stream and reports local service status.
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Eitri agent
    Start,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
