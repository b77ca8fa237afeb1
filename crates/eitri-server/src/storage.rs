/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Persistence seam for the update service.
//!
//! The service records which devices have registered and what services
//! each one last reported. Durable storage lives behind the [`Storage`]
//! trait so deployments can bring their own backend; [`MemoryStorage`]
//! covers single-process deployments and tests.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A service sighting attributed to a registered device. Container
/// sightings also carry the runtime identity of the container; service
/// manager sightings leave those fields empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedService {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub status: String,
    pub container_id: Option<String>,
    pub container_image: Option<String>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

/// Insert payload for a first sighting.
#[derive(Debug, Clone)]
pub struct NewTrackedService {
    pub device_id: i64,
    pub name: String,
    pub status: String,
    pub container_id: Option<String>,
    pub container_image: Option<String>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

/// Backend-agnostic persistence operations used by the update service.
///
/// All methods are synchronous; callers on async paths should keep
/// individual operations short or move them off the runtime threads.
pub trait Storage: Send + Sync {
    /// Looks up a boolean settings flag; `None` means the backend carries
    /// no opinion and the caller applies its default.
    fn get_setting(&self, key: &str) -> Result<Option<bool>, StorageError>;

    /// Service-manager unit names agents should watch.
    fn watched_services(&self) -> Result<Vec<String>, StorageError>;

    /// Records a device registration. Registering the same hostname again
    /// is not an error.
    fn add_device(&self, hostname: &str) -> Result<i64, StorageError>;

    /// Resolves a hostname to its device id, if the device has registered.
    fn resolve_device(&self, hostname: &str) -> Result<Option<i64>, StorageError>;

    /// Finds an existing tracked service row for a device by service name.
    fn find_tracked_service(
        &self,
        device_id: i64,
        name: &str,
    ) -> Result<Option<i64>, StorageError>;

    fn insert_tracked_service(&self, service: NewTrackedService) -> Result<i64, StorageError>;

    fn update_tracked_service(
        &self,
        id: i64,
        status: &str,
        last_seen: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    settings: HashMap<String, bool>,
    watched: Vec<String>,
    devices: HashMap<String, i64>,
    services: HashMap<i64, TrackedService>,
    next_id: i64,
}

/// In-memory [`Storage`] backend.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a settings flag.
    pub fn seed_setting(&self, key: &str, value: bool) {
        let mut state = self.state.lock().unwrap();
        state.settings.insert(key.to_string(), value);
    }

    /// Pre-populates the watched service list.
    pub fn seed_watched_services(&self, services: Vec<String>) {
        let mut state = self.state.lock().unwrap();
        state.watched = services;
    }

    /// Snapshot of every tracked service row, for inspection in tests.
    pub fn list_tracked_services(&self) -> Vec<TrackedService> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<TrackedService> = state.services.values().cloned().collect();
        rows.sort_by_key(|row| row.id);
        rows
    }
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Storage for MemoryStorage {
    fn get_setting(&self, key: &str) -> Result<Option<bool>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.settings.get(key).copied())
    }

    fn watched_services(&self) -> Result<Vec<String>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.watched.clone())
    }

    fn add_device(&self, hostname: &str) -> Result<i64, StorageError> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.devices.get(hostname) {
            return Ok(*id);
        }
        let id = state.allocate_id();
        state.devices.insert(hostname.to_string(), id);
        Ok(id)
    }

    fn resolve_device(&self, hostname: &str) -> Result<Option<i64>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.devices.get(hostname).copied())
    }

    fn find_tracked_service(
        &self,
        device_id: i64,
        name: &str,
    ) -> Result<Option<i64>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .values()
            .find(|row| row.device_id == device_id && row.name == name)
            .map(|row| row.id))
    }

    fn insert_tracked_service(&self, service: NewTrackedService) -> Result<i64, StorageError> {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.services.insert(
            id,
            TrackedService {
                id,
                device_id: service.device_id,
                name: service.name,
                status: service.status,
                container_id: service.container_id,
                container_image: service.container_image,
                last_seen: service.last_seen,
            },
        );
        Ok(id)
    }

    fn update_tracked_service(
        &self,
        id: i64,
        status: &str,
        last_seen: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        match state.services.get_mut(&id) {
            Some(row) => {
                row.status = status.to_string();
                row.last_seen = last_seen;
                Ok(())
            }
            None => Err(StorageError::Backend(format!(
                "no tracked service with id {}",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_registration_is_idempotent() {
        let storage = MemoryStorage::new();
        let first = storage.add_device("node-1").unwrap();
        let second = storage.add_device("node-1").unwrap();
        assert_eq!(first, second);

        let other = storage.add_device("node-2").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_resolve_unknown_device() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.resolve_device("ghost").unwrap(), None);
    }

    #[test]
    fn test_settings_default_to_none() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_setting("subscribe_to_containers").unwrap(), None);

        storage.seed_setting("subscribe_to_containers", false);
        assert_eq!(
            storage.get_setting("subscribe_to_containers").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn test_tracked_service_lifecycle() {
        let storage = MemoryStorage::new();
        let device_id = storage.add_device("node-1").unwrap();

        assert_eq!(
            storage.find_tracked_service(device_id, "nginx").unwrap(),
            None
        );

        let seen = chrono::Utc::now();
        let id = storage
            .insert_tracked_service(NewTrackedService {
                device_id,
                name: "nginx".to_string(),
                status: "running".to_string(),
                container_id: Some("abc123".to_string()),
                container_image: Some("nginx:latest".to_string()),
                last_seen: seen,
            })
            .unwrap();

        assert_eq!(
            storage.find_tracked_service(device_id, "nginx").unwrap(),
            Some(id)
        );

        let later = seen + chrono::Duration::seconds(30);
        storage.update_tracked_service(id, "exited", later).unwrap();

        let rows = storage.list_tracked_services();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "exited");
        assert_eq!(rows[0].last_seen, later);
        // Updates touch status and last-seen only; identity is kept.
        assert_eq!(rows[0].container_id.as_deref(), Some("abc123"));
        assert_eq!(rows[0].container_image.as_deref(), Some("nginx:latest"));
    }

    #[test]
    fn test_update_missing_row_fails() {
        let storage = MemoryStorage::new();
        assert!(storage
            .update_tracked_service(99, "running", chrono::Utc::now())
            .is_err());
    }
}
