//! Persistence boundary.
//!
//! Saving is an opaque call: the session hands over the full set of key
//! locations for a floor plan and the backend replaces what it stored.
//! Device placements are saved one at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use floorsync_types::{DeviceId, FloorPlanId, KeyLocation};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backend could not be reached.
    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the payload.
    #[error("save rejected: {0}")]
    Rejected(String),
}

/// Stores the key locations of a floor plan.
#[async_trait]
pub trait MarkerPersistence: Send + Sync {
    /// Replace every stored key location of the floor plan.
    async fn replace_key_locations(
        &self,
        floor_plan_id: &FloorPlanId,
        locations: &[KeyLocation],
    ) -> Result<(), PersistenceError>;
}

/// Stores device placements.
#[async_trait]
pub trait DevicePositionApi: Send + Sync {
    /// Save one device's position on a floor plan.
    async fn save_position(
        &self,
        floor_plan_id: &FloorPlanId,
        device_id: &DeviceId,
        x: f64,
        y: f64,
    ) -> Result<(), PersistenceError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`MarkerPersistence`] for tests and the CLI simulation.
#[derive(Debug, Default, Clone)]
pub struct MockPersistence {
    inner: Arc<Mutex<MockPersistenceInner>>,
}

#[derive(Debug, Default)]
struct MockPersistenceInner {
    saved: HashMap<FloorPlanId, Vec<KeyLocation>>,
    save_count: usize,
    fail_next_save: Option<String>,
}

impl MockPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved key locations for a floor plan.
    pub fn saved(&self, floor_plan_id: &FloorPlanId) -> Option<Vec<KeyLocation>> {
        lock(&self.inner).saved.get(floor_plan_id).cloned()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        lock(&self.inner).save_count
    }

    /// Cause the next save to fail with the given error.
    pub fn fail_next_save(&self, error: &str) {
        lock(&self.inner).fail_next_save = Some(error.to_string());
    }
}

#[async_trait]
impl MarkerPersistence for MockPersistence {
    async fn replace_key_locations(
        &self,
        floor_plan_id: &FloorPlanId,
        locations: &[KeyLocation],
    ) -> Result<(), PersistenceError> {
        let mut inner = lock(&self.inner);
        if let Some(error) = inner.fail_next_save.take() {
            return Err(PersistenceError::Unavailable(error));
        }
        inner.saved.insert(floor_plan_id.clone(), locations.to_vec());
        inner.save_count += 1;
        Ok(())
    }
}

/// In-memory [`DevicePositionApi`].
#[derive(Debug, Default, Clone)]
pub struct MockDeviceApi {
    inner: Arc<Mutex<MockDeviceApiInner>>,
}

#[derive(Debug, Default)]
struct MockDeviceApiInner {
    positions: HashMap<DeviceId, (FloorPlanId, f64, f64)>,
    fail_next_save: Option<String>,
}

impl MockDeviceApi {
    /// Create an empty API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved position of a device.
    pub fn position(&self, device_id: &DeviceId) -> Option<(FloorPlanId, f64, f64)> {
        lock(&self.inner).positions.get(device_id).cloned()
    }

    /// Cause the next save to fail with the given error.
    pub fn fail_next_save(&self, error: &str) {
        lock(&self.inner).fail_next_save = Some(error.to_string());
    }
}

#[async_trait]
impl DevicePositionApi for MockDeviceApi {
    async fn save_position(
        &self,
        floor_plan_id: &FloorPlanId,
        device_id: &DeviceId,
        x: f64,
        y: f64,
    ) -> Result<(), PersistenceError> {
        let mut inner = lock(&self.inner);
        if let Some(error) = inner.fail_next_save.take() {
            return Err(PersistenceError::Rejected(error));
        }
        inner
            .positions
            .insert(device_id.clone(), (floor_plan_id.clone(), x, y));
        Ok(())
    }
}
