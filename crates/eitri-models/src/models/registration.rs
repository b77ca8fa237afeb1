// src/models/registration.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sent by an agent when it (re-)connects to the update server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
}

/// The server's answer to a registration: which status sources this host
/// should report from, and which service-manager units to watch.
///
/// Registration is idempotent; re-registering simply re-confirms these
/// flags from the server's settings store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub subscribe_to_containers: bool,
    pub subscribe_to_service_manager: bool,
    #[serde(default)]
    pub watched_services: Vec<String>,
}
