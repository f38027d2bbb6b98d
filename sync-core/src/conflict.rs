//! Conflict model for marker synchronization.
//!
//! A conflict records a divergence between the local copy of a marker that
//! has unconfirmed local edits and an incoming remote event for the same
//! marker. Conflicts are first-class state, not errors: depending on the
//! active [`ConflictResolutionStrategy`] they are auto-resolved or wait for
//! an operator to pick a [`Resolution`].

use floorsync_types::{FloorPlanId, Marker, MarkerId, UserId};
use serde::{Deserialize, Serialize};

/// What diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// `x` and/or `y` differ.
    Position,
    /// Non-positional fields differ.
    Properties,
    /// The remote side deleted a marker the local side has modified.
    Deletion,
}

/// Session-wide policy for conflicts detected on inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionStrategy {
    /// Remote wins; remote values are applied immediately.
    #[default]
    ServerAuthoritative,
    /// Local wins; remote values are discarded.
    LocalWins,
    /// Same as `ServerAuthoritative`: the server's delivery order is the
    /// arbitration signal.
    LastWriteWins,
    /// No auto-resolution; the conflict waits for an operator.
    Manual,
}

impl ConflictResolutionStrategy {
    /// What the policy does automatically, or `None` for manual.
    pub fn auto_resolution(&self) -> Option<AutoResolution> {
        match self {
            Self::ServerAuthoritative | Self::LastWriteWins => Some(AutoResolution::RemoteApplied),
            Self::LocalWins => Some(AutoResolution::LocalKept),
            Self::Manual => None,
        }
    }

    /// Parse the snake_case name used in configuration.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "server_authoritative" => Some(Self::ServerAuthoritative),
            "local_wins" => Some(Self::LocalWins),
            "last_write_wins" => Some(Self::LastWriteWins),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// The snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerAuthoritative => "server_authoritative",
            Self::LocalWins => "local_wins",
            Self::LastWriteWins => "last_write_wins",
            Self::Manual => "manual",
        }
    }
}

/// What an auto-resolving policy already did when the conflict was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoResolution {
    /// The remote version replaced the local one.
    RemoteApplied,
    /// The local version was kept and the remote one discarded.
    LocalKept,
}

/// An operator's decision on a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local version.
    KeepLocal,
    /// Adopt the remote version (or perform the remote delete).
    AcceptRemote,
    /// Remote non-positional fields with the local position. Position
    /// conflicts only; other conflict types treat it as `AcceptRemote`.
    Merge,
}

/// A detected divergence between local and remote state for one marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConflict {
    /// The marker in conflict
    pub marker_id: MarkerId,
    /// Floor plan the marker lives on
    pub floor_plan_id: FloorPlanId,
    /// Local snapshot at detection time
    pub local_version: Marker,
    /// Remote snapshot at detection time; `None` for deletions
    pub server_version: Option<Marker>,
    /// What diverged
    pub conflict_type: ConflictType,
    /// The remote actor
    pub remote_user: UserId,
    /// When the conflict was first detected (ms)
    pub detected_at: u64,
    /// Whether an operator has resolved it
    pub resolved: bool,
    /// The operator's decision, once resolved
    pub resolution: Option<Resolution>,
    /// What the policy did on detection
    pub auto_resolution: Option<AutoResolution>,
}

impl MarkerConflict {
    /// Whether the conflict still needs an operator decision.
    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    /// The version a merge produces: remote fields, local position.
    ///
    /// Returns `None` for deletions.
    pub fn merged_version(&self) -> Option<Marker> {
        let server = self.server_version.as_ref()?;
        let mut merged = server.clone();
        merged.x = self.local_version.x;
        merged.y = self.local_version.y;
        Some(merged)
    }
}
