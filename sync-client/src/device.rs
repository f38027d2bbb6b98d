//! Device position sync.
//!
//! Moving an IoT device pin works like a marker edit without conflicts:
//! the placement changes at once, the save runs with the lock released,
//! and a failed save undoes that move only. Overlapping moves of the same
//! device settle independently.

use std::sync::Arc;

use floorsync_core::{DevicePlacement, DevicePositions};
use floorsync_types::{DeviceId, FloorPlanId};
use tokio::sync::Mutex;

use crate::error::ClientError;
use crate::persistence::DevicePositionApi;

/// Device placements for one floor plan.
pub struct DevicePositionSync<A: DevicePositionApi> {
    api: Arc<A>,
    floor_plan_id: FloorPlanId,
    positions: Mutex<DevicePositions>,
    error: Mutex<Option<String>>,
}

impl<A: DevicePositionApi> DevicePositionSync<A> {
    /// Create an empty set of placements for a floor plan.
    pub fn new(api: Arc<A>, floor_plan_id: FloorPlanId) -> Self {
        Self {
            api,
            floor_plan_id,
            positions: Mutex::new(DevicePositions::new()),
            error: Mutex::new(None),
        }
    }

    /// The floor plan the devices are placed on.
    pub fn floor_plan_id(&self) -> &FloorPlanId {
        &self.floor_plan_id
    }

    /// Move a device and save its new position.
    ///
    /// Coordinates are clamped. On failure this move is undone, leaving the
    /// newest move still standing (or the last saved placement), and the
    /// error is kept for display.
    pub async fn move_device(
        &self,
        device_id: DeviceId,
        x: f64,
        y: f64,
    ) -> Result<DevicePlacement, ClientError> {
        let placement = DevicePlacement::new(device_id.clone(), self.floor_plan_id.clone(), x, y);
        let token = self.positions.lock().await.place(placement.clone());

        let result = self
            .api
            .save_position(&self.floor_plan_id, &device_id, placement.x, placement.y)
            .await;

        let mut positions = self.positions.lock().await;
        match result {
            Ok(()) => {
                positions.confirm(&device_id, token);
                tracing::debug!(
                    "Device {} placed at ({:.1}, {:.1})",
                    device_id,
                    placement.x,
                    placement.y
                );
                Ok(placement)
            }
            Err(e) => {
                positions.rollback(&device_id, token);
                drop(positions);
                tracing::warn!("Saving position of device {} failed: {}", device_id, e);
                *self.error.lock().await = Some(format!("Failed to save device position: {e}"));
                Err(e.into())
            }
        }
    }

    /// Apply placements loaded from the backend or made elsewhere.
    ///
    /// Devices with a move in flight keep their local placement.
    pub async fn apply_remote(&self, placements: Vec<DevicePlacement>) -> usize {
        let mut positions = self.positions.lock().await;
        placements
            .into_iter()
            .filter(|p| p.floor_plan_id == self.floor_plan_id)
            .filter(|p| positions.apply_remote(p.clone()))
            .count()
    }

    /// Take a device off the floor plan locally.
    pub async fn remove_device(&self, device_id: &DeviceId) -> Option<DevicePlacement> {
        self.positions.lock().await.remove(device_id)
    }

    /// Current placement of a device.
    pub async fn placement(&self, device_id: &DeviceId) -> Option<DevicePlacement> {
        self.positions.lock().await.get(device_id).cloned()
    }

    /// All placements, sorted by device id.
    pub async fn placements(&self) -> Vec<DevicePlacement> {
        self.positions
            .lock()
            .await
            .placements()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Last error, until dismissed.
    pub async fn last_error(&self) -> Option<String> {
        self.error.lock().await.clone()
    }

    /// Clear the error.
    pub async fn dismiss_error(&self) {
        *self.error.lock().await = None;
    }
}
