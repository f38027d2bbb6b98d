//! IoT device placements on a floor plan.
//!
//! Same optimistic pattern as markers, without conflicts: a local move is
//! applied at once and remembered as pending until the save confirms or
//! rolls it back. Remote placements never overwrite a pending local move.

use std::collections::HashMap;

use floorsync_types::{clamp_percent, DeviceId, FloorPlanId};

/// Where a device sits on a floor plan.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePlacement {
    /// The device
    pub device_id: DeviceId,
    /// Floor plan it is placed on
    pub floor_plan_id: FloorPlanId,
    /// Horizontal position, percent
    pub x: f64,
    /// Vertical position, percent
    pub y: f64,
}

impl DevicePlacement {
    /// Create a placement with clamped coordinates.
    pub fn new(device_id: DeviceId, floor_plan_id: FloorPlanId, x: f64, y: f64) -> Self {
        Self {
            device_id,
            floor_plan_id,
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }
}

/// Identifies one local move until its save settles.
///
/// Tokens are issued in increasing order, so a later move compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoveToken(u64);

#[derive(Debug, Clone)]
struct PendingMoves {
    // Last placement known to the backend; None = unplaced.
    baseline: Option<DevicePlacement>,
    // Move that produced the baseline, if it was a local one.
    baseline_token: Option<MoveToken>,
    // Unsettled moves, oldest first.
    moves: Vec<(MoveToken, DevicePlacement)>,
}

impl PendingMoves {
    fn visible(&self) -> Option<&DevicePlacement> {
        match self.moves.last() {
            Some((token, placement)) if self.baseline_token.map_or(true, |b| *token > b) => {
                Some(placement)
            }
            _ => self.baseline.as_ref(),
        }
    }
}

/// Device placements with pending-move tracking.
///
/// Each move is settled on its own: a failed save only undoes that move,
/// and the device shows the newest move still standing.
#[derive(Debug, Clone, Default)]
pub struct DevicePositions {
    placements: HashMap<DeviceId, DevicePlacement>,
    pending: HashMap<DeviceId, PendingMoves>,
    next_token: u64,
}

impl DevicePositions {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current placement of a device.
    pub fn get(&self, device_id: &DeviceId) -> Option<&DevicePlacement> {
        self.placements.get(device_id)
    }

    /// All placements, sorted by device id.
    pub fn placements(&self) -> Vec<&DevicePlacement> {
        let mut all: Vec<&DevicePlacement> = self.placements.values().collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }

    /// Whether a local move for the device awaits confirmation.
    pub fn is_pending(&self, device_id: &DeviceId) -> bool {
        self.pending.contains_key(device_id)
    }

    /// Optimistically move a device.
    ///
    /// The returned token settles this move with [`confirm`](Self::confirm)
    /// or [`rollback`](Self::rollback).
    pub fn place(&mut self, placement: DevicePlacement) -> MoveToken {
        self.next_token += 1;
        let token = MoveToken(self.next_token);
        let device_id = placement.device_id.clone();

        let current = self.placements.get(&device_id).cloned();
        self.pending
            .entry(device_id.clone())
            .or_insert_with(|| PendingMoves {
                baseline: current,
                baseline_token: None,
                moves: Vec::new(),
            })
            .moves
            .push((token, placement.clone()));
        self.placements.insert(device_id, placement);
        token
    }

    /// The save for one move succeeded.
    pub fn confirm(&mut self, device_id: &DeviceId, token: MoveToken) -> bool {
        let Some(entry) = self.pending.get_mut(device_id) else {
            return false;
        };
        let Some(index) = entry.moves.iter().position(|(t, _)| *t == token) else {
            return false;
        };
        let (_, placement) = entry.moves.remove(index);
        // A slower save of an older move does not replace a newer one.
        if entry.baseline_token.map_or(true, |b| token > b) {
            entry.baseline = Some(placement);
            entry.baseline_token = Some(token);
        }
        self.settle(device_id);
        true
    }

    /// The save for one move failed; undo that move only.
    pub fn rollback(&mut self, device_id: &DeviceId, token: MoveToken) -> bool {
        let Some(entry) = self.pending.get_mut(device_id) else {
            return false;
        };
        let Some(index) = entry.moves.iter().position(|(t, _)| *t == token) else {
            return false;
        };
        entry.moves.remove(index);
        self.settle(device_id);
        true
    }

    /// Apply a placement made elsewhere.
    ///
    /// While a local move is pending the placement only becomes the state a
    /// failed move falls back to; returns whether it is visible now.
    pub fn apply_remote(&mut self, placement: DevicePlacement) -> bool {
        if let Some(entry) = self.pending.get_mut(&placement.device_id) {
            entry.baseline = Some(placement);
            entry.baseline_token = None;
            return false;
        }
        self.placements.insert(placement.device_id.clone(), placement);
        true
    }

    /// Remove a device from the floor plan.
    pub fn remove(&mut self, device_id: &DeviceId) -> Option<DevicePlacement> {
        self.pending.remove(device_id);
        self.placements.remove(device_id)
    }

    fn settle(&mut self, device_id: &DeviceId) {
        let Some(entry) = self.pending.get(device_id) else {
            return;
        };
        match entry.visible().cloned() {
            Some(placement) => {
                self.placements.insert(device_id.clone(), placement);
            }
            None => {
                self.placements.remove(device_id);
            }
        }
        if entry.moves.is_empty() {
            self.pending.remove(device_id);
        }
    }
}
