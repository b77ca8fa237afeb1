/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use eitri_utils::config::Settings;
use eitri_utils::logging::prelude::*;

/// Determines the hostname this agent identifies itself with: the
/// configured value when set, otherwise the host's own name, with a fixed
/// fallback if neither is available.
pub fn resolve_hostname(config: &Settings) -> String {
    if !config.agent.hostname.is_empty() {
        return config.agent.hostname.clone();
    }
    match std::fs::read_to_string("/etc/hostname") {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            warn!("could not determine hostname, using fallback");
            "eitri".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_hostname_wins() {
        let mut config = Settings::new(None).unwrap();
        config.agent.hostname = "node-42".to_string();
        assert_eq!(resolve_hostname(&config), "node-42");
    }

    #[test]
    fn test_empty_config_falls_back() {
        let mut config = Settings::new(None).unwrap();
        config.agent.hostname = String::new();
        // Either the machine hostname or the fixed fallback; never empty.
        assert!(!resolve_hostname(&config).is_empty());
    }
}
