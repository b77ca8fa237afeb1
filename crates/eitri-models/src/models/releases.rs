// src/models/releases.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One downloadable file belonging to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: String,
    pub source_url: String,
}

/// A concrete installable unit produced from a release trigger event.
///
/// Built transiently by the server when a release event matches a configured
/// package; broadcast to every connected agent stream and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    /// Package identifier from the topology.
    pub name: String,
    /// Version string carried over from the trigger event.
    pub version: String,
    /// Full name of the source repository (e.g. "org/tool").
    pub repository: String,
    /// Install command template; `{}` is replaced with the downloaded
    /// asset's local path, `;` separates commands.
    pub install_command: String,
    pub assets: Vec<Asset>,
}

/// A single frame on the release stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseEnvelope {
    pub release: Release,
    pub timestamp: DateTime<Utc>,
}

/// The release-published notification posted by GitHub to the webhook
/// endpoint. Only the fields the server acts on are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubReleaseEvent {
    #[serde(default)]
    pub action: Option<String>,
    pub repository: EventRepository,
    pub release: EventRelease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRepository {
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRelease {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<EventAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl EventRelease {
    /// The version string to stamp on a broadcast release: the release
    /// name when present, otherwise the tag name.
    pub fn version(&self) -> &str {
        if self.name.is_empty() {
            &self.tag_name
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_envelope_round_trip() {
        let envelope = ReleaseEnvelope {
            release: Release {
                name: "agent-tool".to_string(),
                version: "v1.2.0".to_string(),
                repository: "org/tool".to_string(),
                install_command: "tar -xzf {}".to_string(),
                assets: vec![Asset {
                    name: "tool-linux-amd64.tar.gz".to_string(),
                    source_url:
                        "https://github.com/org/tool/releases/download/v1.2.0/tool-linux-amd64.tar.gz"
                            .to_string(),
                }],
            },
            timestamp: Utc::now(),
        };

        let line = serde_json::to_string(&envelope).unwrap();
        let parsed: ReleaseEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.release, envelope.release);
    }

    #[test]
    fn test_github_event_parses_webhook_payload() {
        let payload = r#"{
            "action": "published",
            "release": {
                "name": "v1.2.0",
                "tag_name": "v1.2.0",
                "assets": [
                    {
                        "name": "tool-linux-amd64.tar.gz",
                        "browser_download_url": "https://github.com/org/tool/releases/download/v1.2.0/tool-linux-amd64.tar.gz",
                        "content_type": "application/gzip"
                    }
                ]
            },
            "repository": {
                "name": "tool",
                "full_name": "org/tool",
                "private": false
            }
        }"#;

        let event: GithubReleaseEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.repository.full_name, "org/tool");
        assert_eq!(event.release.version(), "v1.2.0");
        assert_eq!(event.release.assets.len(), 1);
    }

    #[test]
    fn test_event_release_version_falls_back_to_tag() {
        let release = EventRelease {
            name: String::new(),
            tag_name: "v0.3.1".to_string(),
            assets: vec![],
        };
        assert_eq!(release.version(), "v0.3.1");
    }
}
