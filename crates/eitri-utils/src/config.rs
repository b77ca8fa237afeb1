/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Eitri Config Module
//! This module provides a common configuration framework for our crates.
//!
//! # Variable Naming Convention
//!
//! Variables in this configuration framework follow these naming conventions:
//! - Struct fields use snake_case (e.g., `download_dir`, `log_level`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "EITRI__" (e.g., `EITRI__AGENT__SERVER_URL`)
//! - Configuration file keys use snake_case (e.g., `server.port`, `log.level`)
//!
//! # Configuration Overriding
//!
//! The configuration values are loaded and overridden in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! To override a configuration value:
//! - In a configuration file: Use the appropriate key (e.g., `server.port = 9191`)
//! - Using environment variables: Set the variable with the "EITRI__" prefix and "__" as separators
//!   (e.g., `EITRI__SERVER__PORT=9191`)

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Update server configuration
    pub server: Server,
    /// Agent configuration
    pub agent: Agent,
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Represents the update server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    /// Port the API and stream endpoints listen on
    pub port: u16,
    /// Path to the topology file describing packages and host targeting
    pub topology_file: String,
    /// Whether registering agents should report container status
    pub subscribe_to_containers: bool,
    /// Whether registering agents should report service-manager status
    pub subscribe_to_service_manager: bool,
    /// Service-manager unit names agents should watch
    #[serde(default)]
    pub watched_services: Vec<String>,
}

/// Represents the agent configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Agent {
    /// Update server URL
    pub server_url: String,
    /// Hostname to register as; empty means read /etc/hostname
    #[serde(default)]
    pub hostname: String,
    /// Directory release assets are downloaded into
    pub download_dir: String,
    /// Max number of attempts when waiting for the server to be ready
    pub max_retries: u32,
    /// Deadline for the registration call in seconds
    pub register_timeout_seconds: u64,
    /// Cooldown between agent cycles after a failure in seconds
    pub retry_cooldown_seconds: u64,
    /// Interval between service status reports in seconds
    pub report_interval_seconds: u64,
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        // Start with default settings from the embedded TOML file
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        // If a configuration file is provided, add it as a source
        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        // Add environment variables as a source, prefixed with "EITRI" and using "__" as a separator
        s = s.add_source(Environment::with_prefix("EITRI").separator("__"));

        // Build the configuration
        let settings = s.build()?;

        // Deserialize the configuration into a Settings instance
        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    /// Test the creation of Settings with default values
    ///
    /// This test ensures that:
    /// 1. A Settings instance can be created successfully using the `new` method
    /// 2. When no custom configuration is provided (None), the default values are set correctly
    fn test_settings_default_values() {
        let settings = Settings::new(None).unwrap();

        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.topology_file, "topology.toml");
        assert!(settings.server.subscribe_to_containers);
        assert!(settings.server.subscribe_to_service_manager);
        assert!(settings.server.watched_services.is_empty());
    }

    #[test]
    fn test_agent_default_values() {
        let settings = Settings::new(None).unwrap();

        assert_eq!(settings.agent.server_url, "http://localhost:9090");
        assert_eq!(settings.agent.download_dir, "/tmp");
        assert_eq!(settings.agent.register_timeout_seconds, 5);
        assert_eq!(settings.agent.retry_cooldown_seconds, 60);
        assert_eq!(settings.agent.report_interval_seconds, 30);
    }

    #[test]
    fn test_log_default_format_is_text() {
        let settings = Settings::new(None).unwrap();
        assert_eq!(settings.log.format, "text");
    }
}
