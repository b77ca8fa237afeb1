/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! The update service: agent registration, release propagation, and
//! service report ingestion.
//!
//! Release events from the webhook are matched against the targeting
//! index, converted into [`Release`] messages, and broadcast to every
//! connected agent's stream; per-host filtering happens on each stream so
//! the broker itself stays targeting-agnostic.

use crate::broker::{Broker, SubscriptionUnavailable};
use crate::storage::{NewTrackedService, Storage};
use crate::topology::{PackageSource, TargetingIndex};
use eitri_models::models::registration::{RegisterRequest, RegisterResponse};
use eitri_models::models::releases::{Asset, GithubReleaseEvent, Release, ReleaseEnvelope};
use eitri_models::models::services::{ServiceDetail, ServicesReport};
use eitri_utils::logging::prelude::*;
use futures::Stream;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

/// Settings keys consulted at registration time.
const SETTING_CONTAINERS: &str = "subscribe_to_containers";
const SETTING_SERVICE_MANAGER: &str = "subscribe_to_service_manager";

#[derive(Clone)]
pub struct UpdateService {
    index: Arc<TargetingIndex>,
    broker: Broker<Release>,
    storage: Arc<dyn Storage>,
}

impl UpdateService {
    pub fn new(index: Arc<TargetingIndex>, storage: Arc<dyn Storage>) -> Self {
        UpdateService {
            index,
            broker: Broker::new(),
            storage,
        }
    }

    /// Records the agent as a device and tells it which collectors to run.
    /// Settings the backend carries no opinion on default to enabled.
    pub fn register(&self, request: &RegisterRequest) -> RegisterResponse {
        match self.storage.add_device(&request.hostname) {
            Ok(id) => info!("agent '{}' registered as device {}", request.hostname, id),
            Err(e) => warn!(
                "agent '{}' registered but device record failed: {}",
                request.hostname, e
            ),
        }

        let flag = |key: &str| -> bool {
            match self.storage.get_setting(key) {
                Ok(value) => value.unwrap_or(true),
                Err(e) => {
                    warn!("setting '{}' unavailable, defaulting on: {}", key, e);
                    true
                }
            }
        };

        let watched_services = self.storage.watched_services().unwrap_or_else(|e| {
            warn!("watched services unavailable: {}", e);
            Vec::new()
        });

        RegisterResponse {
            subscribe_to_containers: flag(SETTING_CONTAINERS),
            subscribe_to_service_manager: flag(SETTING_SERVICE_MANAGER),
            watched_services,
        }
    }

    /// Opens a release stream for `hostname`. The stream yields one
    /// envelope per broadcast release the host is entitled to and ends when
    /// the service stops.
    pub async fn release_stream(
        &self,
        hostname: String,
    ) -> Result<impl Stream<Item = ReleaseEnvelope>, SubscriptionUnavailable> {
        let subscription = self.broker.subscribe().await?;
        info!("release stream opened for '{}'", hostname);

        let index = Arc::clone(&self.index);
        let stream = futures::stream::unfold(
            (subscription, index, hostname),
            |(mut subscription, index, hostname)| async move {
                loop {
                    match subscription.recv().await {
                        Some(release) => {
                            if !index.is_host_targeted(&release.name, &hostname) {
                                debug!(
                                    "release '{}' not targeted at '{}', skipping",
                                    release.name, hostname
                                );
                                continue;
                            }
                            let envelope = ReleaseEnvelope {
                                release,
                                timestamp: chrono::Utc::now(),
                            };
                            return Some((envelope, (subscription, index, hostname)));
                        }
                        None => {
                            info!("release stream for '{}' ended", hostname);
                            return None;
                        }
                    }
                }
            },
        );
        Ok(stream)
    }

    /// Consumes an agent's report stream until it ends or errors, keeping
    /// the tracked-service rows for its device current.
    ///
    /// The first report binds the stream to a device; reports from
    /// unregistered hosts end the stream without recording anything.
    pub async fn ingest_services<S, E>(&self, mut reports: S)
    where
        S: Stream<Item = Result<ServicesReport, E>> + Unpin,
        E: Display,
    {
        use futures::StreamExt;

        let mut device: Option<(i64, String)> = None;
        let mut session: HashMap<String, i64> = HashMap::new();

        loop {
            let report = match reports.next().await {
                Some(Ok(report)) => report,
                Some(Err(e)) => {
                    if let Some((_, hostname)) = &device {
                        warn!("services stream from '{}' failed: {}", hostname, e);
                    } else {
                        warn!("services stream failed before first report: {}", e);
                    }
                    return;
                }
                None => {
                    if let Some((_, hostname)) = &device {
                        info!("services stream from '{}' closed", hostname);
                    }
                    return;
                }
            };

            let device_id = match &device {
                Some((id, _)) => *id,
                None => match self.storage.resolve_device(&report.hostname) {
                    Ok(Some(id)) => {
                        device = Some((id, report.hostname.clone()));
                        id
                    }
                    Ok(None) => {
                        warn!(
                            "services report from unregistered host '{}', dropping stream",
                            report.hostname
                        );
                        return;
                    }
                    Err(e) => {
                        warn!("device lookup for '{}' failed: {}", report.hostname, e);
                        return;
                    }
                },
            };

            for status in &report.services {
                let last_seen = report.timestamp;
                let state = status.detail.status().to_string();

                let row = match session.get(&status.name) {
                    Some(id) => Some(*id),
                    None => match self.storage.find_tracked_service(device_id, &status.name) {
                        Ok(found) => found,
                        Err(e) => {
                            warn!("lookup for service '{}' failed: {}", status.name, e);
                            continue;
                        }
                    },
                };

                let result = match row {
                    Some(id) => {
                        session.insert(status.name.clone(), id);
                        self.storage.update_tracked_service(id, &state, last_seen)
                    }
                    None => {
                        // First sightings keep the kind-specific identity;
                        // container rows record which container was seen.
                        let (container_id, container_image) = match &status.detail {
                            ServiceDetail::Container { id, image, .. } => {
                                (Some(id.clone()), Some(image.clone()))
                            }
                            ServiceDetail::ServiceManager { .. } => (None, None),
                        };
                        self.storage
                            .insert_tracked_service(NewTrackedService {
                                device_id,
                                name: status.name.clone(),
                                status: state.clone(),
                                container_id,
                                container_image,
                                last_seen,
                            })
                            .map(|id| {
                                session.insert(status.name.clone(), id);
                            })
                    }
                };
                if let Err(e) = result {
                    warn!("recording service '{}' failed: {}", status.name, e);
                }
            }
        }
    }

    /// Turns a GitHub release event into a broadcast [`Release`], if the
    /// repository is a configured package and the event carries a usable
    /// asset. Events that do not are logged and dropped.
    pub fn propagate_release(&self, event: &GithubReleaseEvent) {
        let repo = &event.repository.full_name;

        let Some(package) = self.index.package_for_repo(repo) else {
            debug!("release event for unconfigured repo '{}', ignoring", repo);
            return;
        };
        let PackageSource::Github { asset_pattern, .. } = &package.source else {
            debug!("package '{}' has no github source, ignoring", package.id);
            return;
        };

        // Only assets hosted on the repository's own releases page are
        // accepted; the pattern alone does not pin the download origin.
        let url_prefix = format!("https://github.com/{}/releases", repo);
        let assets: Vec<Asset> = event
            .release
            .assets
            .iter()
            .filter(|asset| {
                asset_pattern.is_match(&asset.name)
                    && asset.browser_download_url.starts_with(&url_prefix)
            })
            .map(|asset| Asset {
                name: asset.name.clone(),
                source_url: asset.browser_download_url.clone(),
            })
            .collect();

        if assets.is_empty() {
            warn!(
                "release '{}' of '{}' has no matching assets, dropping",
                event.release.version(),
                repo
            );
            return;
        }

        let release = Release {
            name: package.id.clone(),
            version: event.release.version().to_string(),
            repository: repo.clone(),
            install_command: package.install_command.clone(),
            assets,
        };
        info!(
            "propagating release '{}' {} ({} asset(s))",
            release.name,
            release.version,
            release.assets.len()
        );
        self.broker.broadcast(release);
    }

    /// Number of open release streams.
    pub async fn connected_agents(&self) -> usize {
        self.broker.count().await
    }

    /// Ends every release stream and rejects new ones.
    pub fn stop(&self) {
        self.broker.stop();
    }
}
