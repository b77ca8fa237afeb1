//! Eitri server CLI application
//!
//! This module provides the command-line interface for the Eitri server.
//! It includes functionality for serving the distribution API and for
//! validating topology files.

use eitri_server::cli::{commands, parse_cli, Commands};
use eitri_utils::config::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_cli();

    // Load configuration
    let config = Settings::new(None).expect("Failed to load configuration");

    // Initialize logger
    eitri_utils::logging::init_with_format(&config.log.level, &config.log.format)
        .expect("Failed to initialize logger");

    // Execute the appropriate command
    match cli.command {
        Commands::Serve => commands::serve(&config).await?,
        Commands::CheckTopology { path } => commands::check_topology(&config, path)?,
    }
    Ok(())
}
