pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
/// Eitri Server CLI
///
/// This CLI provides commands to manage the Eitri server, which distributes
/// package releases to registered agents and collects their service reports.
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Eitri server
    Serve,

    /// Validate the topology file and print a summary
    CheckTopology {
        /// Path to the topology file; defaults to the configured one
        #[arg(long)]
        path: Option<String>,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
