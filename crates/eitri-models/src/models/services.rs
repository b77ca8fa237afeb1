// src/models/services.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One frame on the service-status reporting stream: everything a host
/// observed about its services at one sampling instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesReport {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub services: Vec<ServiceStatus>,
}

/// Status of a single service on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceStatus {
    pub name: String,
    #[serde(flatten)]
    pub detail: ServiceDetail,
}

/// Kind-specific status fields. Exactly one variant per entry; consumers
/// match exhaustively where they need kind-specific data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceDetail {
    /// A container reported by the container runtime.
    Container {
        id: String,
        image: String,
        #[serde(default)]
        command: String,
        #[serde(default)]
        created: i64,
        #[serde(default)]
        ports: Vec<u32>,
        state: String,
        status: String,
    },
    /// A unit reported by the host's service manager.
    ServiceManager {
        #[serde(default)]
        description: String,
        load_state: String,
        active_state: String,
    },
}

impl ServiceDetail {
    /// The single status string persisted for this entry: the container
    /// status line, or the service manager's active state.
    pub fn status(&self) -> &str {
        match self {
            ServiceDetail::Container { status, .. } => status,
            ServiceDetail::ServiceManager { active_state, .. } => active_state,
        }
    }
}
