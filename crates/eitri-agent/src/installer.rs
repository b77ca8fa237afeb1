/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Release installation: asset download and install command execution.
//!
//! Assets land under `<download_dir>/<release name>/` and the package's
//! install command template runs once per downloaded asset, with `{}`
//! replaced by the asset's local path. A failure at any step aborts the
//! remaining steps for that release; the agent stays subscribed and will
//! act on the next release normally.

use eitri_models::models::releases::Release;
use eitri_utils::logging::prelude::*;
use reqwest::Client;
use std::path::Path;
use tokio::process::Command;

/// Downloads every asset of `release` and runs its install command.
/// Returns whether the whole installation succeeded.
pub async fn install_release(client: &Client, download_dir: &Path, release: &Release) -> bool {
    let target_dir = download_dir.join(&release.name);
    if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
        error!(
            "Failed to create download directory {}: {}",
            target_dir.display(),
            e
        );
        return false;
    }

    for asset in &release.assets {
        let path = target_dir.join(&asset.name);

        info!(
            "Downloading {} for release '{}' {}",
            asset.name, release.name, release.version
        );
        let response = match client.get(&asset.source_url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to download {}: {}", asset.source_url, e);
                return false;
            }
        };
        if !response.status().is_success() {
            error!(
                "Download of {} failed with status {}",
                asset.source_url,
                response.status()
            );
            return false;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read asset body for {}: {}", asset.name, e);
                return false;
            }
        };
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            error!("Failed to write asset to {}: {}", path.display(), e);
            return false;
        }

        for command in build_commands(&release.install_command, &path.to_string_lossy()) {
            info!("Running install step: {}", command.join(" "));
            let output = match Command::new(&command[0]).args(&command[1..]).output().await {
                Ok(output) => output,
                Err(e) => {
                    error!("Failed to run install step '{}': {}", command[0], e);
                    return false;
                }
            };
            if !output.status.success() {
                error!(
                    "Install step '{}' exited with {}: {}",
                    command.join(" "),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return false;
            }
        }
    }

    info!(
        "Release '{}' {} installed successfully",
        release.name, release.version
    );
    true
}

/// Expands an install command template into argument vectors: commands are
/// separated by `;`, `{}` is replaced with the downloaded asset path, and
/// each command is split on whitespace. Empty segments are dropped.
fn build_commands(template: &str, asset_path: &str) -> Vec<Vec<String>> {
    template
        .split(';')
        .map(|segment| {
            segment
                .replace("{}", asset_path)
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<String>>()
        })
        .filter(|command| !command.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eitri_models::models::releases::Asset;

    #[test]
    fn test_build_commands_substitutes_path() {
        let commands = build_commands("tar -xzf {}", "/tmp/pkg/asset.tar.gz");
        assert_eq!(
            commands,
            vec![vec![
                "tar".to_string(),
                "-xzf".to_string(),
                "/tmp/pkg/asset.tar.gz".to_string()
            ]]
        );
    }

    #[test]
    fn test_build_commands_splits_on_semicolons() {
        let commands = build_commands("chmod +x {}; mv {} /usr/local/bin/tool", "/tmp/tool");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], vec!["chmod", "+x", "/tmp/tool"]);
        assert_eq!(commands[1], vec!["mv", "/tmp/tool", "/usr/local/bin/tool"]);
    }

    #[test]
    fn test_build_commands_drops_empty_segments() {
        let commands = build_commands("true {};; ", "/tmp/x");
        assert_eq!(commands, vec![vec!["true", "/tmp/x"]]);
    }

    fn release(install_command: &str, source_url: &str) -> Release {
        Release {
            name: "agent-tool".to_string(),
            version: "v1.0.0".to_string(),
            repository: "org/tool".to_string(),
            install_command: install_command.to_string(),
            assets: vec![Asset {
                name: "tool.bin".to_string(),
                source_url: source_url.to_string(),
            }],
        }
    }

    async fn asset_server() -> String {
        use axum::{routing::get, Router};

        let app = Router::new().route("/asset", get(|| async { "payload" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/asset", addr)
    }

    #[tokio::test]
    async fn test_install_downloads_and_runs_command() {
        let url = asset_server().await;
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new();

        let ok = install_release(&client, dir.path(), &release("true {}", &url)).await;
        assert!(ok);

        let written = dir.path().join("agent-tool").join("tool.bin");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_install_fails_on_nonzero_exit() {
        let url = asset_server().await;
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new();

        let ok = install_release(&client, dir.path(), &release("false", &url)).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_failed_step_skips_remaining_commands() {
        let url = asset_server().await;
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new();

        let marker = dir.path().join("marker");
        let command = format!("false; touch {}", marker.display());

        let ok = install_release(&client, dir.path(), &release(&command, &url)).await;
        assert!(!ok);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_install_fails_on_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new();

        let ok = install_release(
            &client,
            dir.path(),
            &release("true", "http://127.0.0.1:1/asset"),
        )
        .await;
        assert!(!ok);
    }
}
