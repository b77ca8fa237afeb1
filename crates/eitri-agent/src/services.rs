/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Service status collection and the reporting stream.
//!
//! Collectors implement [`StatusSource`]; the server's registration
//! response decides which ones run. Reports are streamed to the server as
//! newline-delimited JSON on a single long-lived request body, one report
//! per interval tick, until shutdown closes the body.

use bytes::Bytes;
use eitri_models::models::services::{ServiceDetail, ServiceStatus, ServicesReport};
use eitri_utils::config::Settings;
use eitri_utils::logging::prelude::*;
use futures::SinkExt;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

/// A source of service status observations. Collection is synchronous and
/// best-effort; a source that cannot observe anything returns an empty
/// list.
pub trait StatusSource: Send + Sync {
    fn collect(&self) -> Vec<ServiceStatus>;
}

/// Reports containers known to the local container runtime.
pub struct ContainerSource;

impl StatusSource for ContainerSource {
    fn collect(&self) -> Vec<ServiceStatus> {
        let output = match std::process::Command::new("docker")
            .args(["ps", "--all", "--format", "{{json .}}"])
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(
                    "docker ps exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return Vec::new();
            }
            Err(e) => {
                warn!("could not run docker ps: {}", e);
                return Vec::new();
            }
        };

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_docker_ps_line)
            .collect()
    }
}

/// Parses one `docker ps --format '{{json .}}'` output line.
fn parse_docker_ps_line(line: &str) -> Option<ServiceStatus> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    let field = |key: &str| -> String {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let name = field("Names");
    if name.is_empty() {
        return None;
    }
    Some(ServiceStatus {
        name,
        detail: ServiceDetail::Container {
            id: field("ID"),
            image: field("Image"),
            command: field("Command"),
            created: 0,
            ports: parse_ports(&field("Ports")),
            state: field("State"),
            status: field("Status"),
        },
    })
}

/// Extracts container-side port numbers from a docker ps Ports column,
/// e.g. `0.0.0.0:8080->80/tcp, :::8080->80/tcp` yields `[80, 80]`.
fn parse_ports(ports: &str) -> Vec<u32> {
    ports
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let container_side = match entry.split("->").last() {
                Some(side) => side,
                None => return None,
            };
            container_side
                .split('/')
                .next()
                .and_then(|port| port.trim().parse().ok())
        })
        .collect()
}

/// Reports the watched units of the host's service manager.
pub struct ServiceManagerSource {
    units: Vec<String>,
}

impl ServiceManagerSource {
    pub fn new(units: Vec<String>) -> Self {
        ServiceManagerSource { units }
    }
}

impl StatusSource for ServiceManagerSource {
    fn collect(&self) -> Vec<ServiceStatus> {
        self.units
            .iter()
            .filter_map(|unit| {
                let output = std::process::Command::new("systemctl")
                    .args([
                        "show",
                        unit,
                        "--property=Description,LoadState,ActiveState",
                    ])
                    .output();
                match output {
                    Ok(output) if output.status.success() => parse_systemctl_show(
                        unit,
                        &String::from_utf8_lossy(&output.stdout),
                    ),
                    Ok(output) => {
                        warn!(
                            "systemctl show {} exited with {}",
                            unit, output.status
                        );
                        None
                    }
                    Err(e) => {
                        warn!("could not run systemctl show {}: {}", unit, e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Parses `systemctl show` Key=Value output for one unit.
fn parse_systemctl_show(unit: &str, output: &str) -> Option<ServiceStatus> {
    let mut description = String::new();
    let mut load_state = String::new();
    let mut active_state = String::new();

    for line in output.lines() {
        match line.split_once('=') {
            Some(("Description", value)) => description = value.to_string(),
            Some(("LoadState", value)) => load_state = value.to_string(),
            Some(("ActiveState", value)) => active_state = value.to_string(),
            _ => {}
        }
    }
    if load_state.is_empty() && active_state.is_empty() {
        return None;
    }
    Some(ServiceStatus {
        name: unit.to_string(),
        detail: ServiceDetail::ServiceManager {
            description,
            load_state,
            active_state,
        },
    })
}

/// Streams service reports to the server until shutdown.
///
/// One POST request carries the whole session: each interval tick collects
/// from every source and appends one JSON line to the request body. The
/// body closes when shutdown is signalled, which ends the request.
pub async fn report_services(
    config: &Settings,
    client: &Client,
    hostname: &str,
    sources: Vec<Box<dyn StatusSource>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if sources.is_empty() {
        info!("No status sources enabled, not reporting services");
        return;
    }

    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, std::io::Error>>(8);
    let url = format!("{}/api/v1/services/stream", config.agent.server_url);

    let request = client.post(&url).body(reqwest::Body::wrap_stream(rx));
    let sender = tokio::spawn(async move {
        match request.send().await {
            Ok(response) => debug!("services stream closed with status {}", response.status()),
            Err(e) => warn!("services stream request failed: {}", e),
        }
    });

    let mut ticker = interval(Duration::from_secs(config.agent.report_interval_seconds));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = ServicesReport {
                    hostname: hostname.to_string(),
                    timestamp: chrono::Utc::now(),
                    services: sources.iter().flat_map(|source| source.collect()).collect(),
                };
                let mut line = match serde_json::to_string(&report) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("could not serialize services report: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                debug!("reporting {} service(s)", report.services.len());
                if tx.send(Ok(Bytes::from(line))).await.is_err() {
                    warn!("services stream body closed, stopping reports");
                    break;
                }
            }
            _ = shutdown.recv() => {
                info!("Stopping service reports");
                break;
            }
        }
    }

    // Closing the sender ends the request body and lets the POST complete.
    drop(tx);
    let _ = sender.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_ps_line() {
        let line = r#"{"ID":"abc123","Image":"nginx:latest","Command":"\"nginx -g daemon off\"","Names":"web","Ports":"0.0.0.0:8080->80/tcp, :::8080->80/tcp","State":"running","Status":"Up 3 days"}"#;

        let status = parse_docker_ps_line(line).unwrap();
        assert_eq!(status.name, "web");
        match status.detail {
            ServiceDetail::Container {
                id,
                image,
                ports,
                state,
                status,
                ..
            } => {
                assert_eq!(id, "abc123");
                assert_eq!(image, "nginx:latest");
                assert_eq!(ports, vec![80, 80]);
                assert_eq!(state, "running");
                assert_eq!(status, "Up 3 days");
            }
            other => panic!("expected container detail, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_docker_ps_line_rejects_garbage() {
        assert!(parse_docker_ps_line("not json").is_none());
        assert!(parse_docker_ps_line(r#"{"Image":"x"}"#).is_none());
    }

    #[test]
    fn test_parse_ports() {
        assert_eq!(parse_ports("0.0.0.0:8080->80/tcp"), vec![80]);
        assert_eq!(
            parse_ports("0.0.0.0:443->443/tcp, 0.0.0.0:53->53/udp"),
            vec![443, 53]
        );
        assert!(parse_ports("").is_empty());
    }

    #[test]
    fn test_parse_systemctl_show() {
        let output = "Description=SSH daemon\nLoadState=loaded\nActiveState=active\n";

        let status = parse_systemctl_show("sshd.service", output).unwrap();
        assert_eq!(status.name, "sshd.service");
        match status.detail {
            ServiceDetail::ServiceManager {
                description,
                load_state,
                active_state,
            } => {
                assert_eq!(description, "SSH daemon");
                assert_eq!(load_state, "loaded");
                assert_eq!(active_state, "active");
            }
            other => panic!("expected service manager detail, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_systemctl_show_requires_states() {
        assert!(parse_systemctl_show("ghost.service", "Description=x\n").is_none());
    }

    struct FixedSource;

    impl StatusSource for FixedSource {
        fn collect(&self) -> Vec<ServiceStatus> {
            vec![ServiceStatus {
                name: "sshd.service".to_string(),
                detail: ServiceDetail::ServiceManager {
                    description: String::new(),
                    load_state: "loaded".to_string(),
                    active_state: "active".to_string(),
                },
            }]
        }
    }

    async fn capture(
        State(seen): State<tokio::sync::mpsc::Sender<String>>,
        body: axum::body::Body,
    ) -> axum::http::StatusCode {
        let mut stream = body.into_data_stream();
        let mut buf = Vec::new();
        while let Ok(Some(line)) = eitri_utils::ndjson::next_line(&mut stream, &mut buf).await {
            let _ = seen.send(line).await;
        }
        axum::http::StatusCode::OK
    }

    use axum::extract::State;

    #[tokio::test]
    async fn test_report_loop_streams_reports_until_shutdown() {
        use axum::routing::post;
        use axum::Router;

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::channel::<String>(4);
        let app = Router::new()
            .route("/api/v1/services/stream", post(capture))
            .with_state(seen_tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Settings::new(None).unwrap();
        config.agent.server_url = format!("http://{}", addr);
        config.agent.report_interval_seconds = 1;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reporter = tokio::spawn(async move {
            let client = Client::new();
            report_services(
                &config,
                &client,
                "node-1",
                vec![Box::new(FixedSource)],
                shutdown_rx,
            )
            .await;
        });

        let line = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("no report arrived")
            .unwrap();
        let report: ServicesReport = serde_json::from_str(&line).unwrap();
        assert_eq!(report.hostname, "node-1");
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.services[0].name, "sshd.service");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), reporter)
            .await
            .expect("reporter did not stop")
            .unwrap();
    }
}
