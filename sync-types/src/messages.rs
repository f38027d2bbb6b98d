//! Real-time channel messages for floorsync.
//!
//! These are the payloads that travel inside an [`Envelope`](crate::Envelope).
//! Every message names the floor plan (room) it belongs to; marker messages
//! also carry the originating session id as `client_id` so the origin can
//! recognise the server's echo of its own operation.

use serde::{Deserialize, Serialize};

use crate::{FloorPlanId, Marker, MarkerChanges, MarkerId, SessionId, UserId};

/// All possible channel messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A marker was added
    MarkerAdd(AddMarker),
    /// Fields of a marker changed
    MarkerUpdate(UpdateMarker),
    /// A marker was removed
    MarkerDelete(DeleteMarker),
    /// Periodic liveness signal
    PresenceHeartbeat(PresenceHeartbeat),
    /// A user left the floor plan
    PresenceLeave(PresenceLeave),
}

impl Message {
    /// Discriminator of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::MarkerAdd(_) => MessageKind::MarkerAdd,
            Self::MarkerUpdate(_) => MessageKind::MarkerUpdate,
            Self::MarkerDelete(_) => MessageKind::MarkerDelete,
            Self::PresenceHeartbeat(_) => MessageKind::PresenceHeartbeat,
            Self::PresenceLeave(_) => MessageKind::PresenceLeave,
        }
    }

    /// The floor plan this message targets.
    pub fn floor_plan_id(&self) -> &FloorPlanId {
        match self {
            Self::MarkerAdd(m) => &m.floor_plan_id,
            Self::MarkerUpdate(m) => &m.floor_plan_id,
            Self::MarkerDelete(m) => &m.floor_plan_id,
            Self::PresenceHeartbeat(m) => &m.floor_plan_id,
            Self::PresenceLeave(m) => &m.floor_plan_id,
        }
    }

    /// The originating session, for marker messages.
    pub fn client_id(&self) -> Option<SessionId> {
        match self {
            Self::MarkerAdd(m) => Some(m.client_id),
            Self::MarkerUpdate(m) => Some(m.client_id),
            Self::MarkerDelete(m) => Some(m.client_id),
            Self::PresenceHeartbeat(_) | Self::PresenceLeave(_) => None,
        }
    }
}

/// Message type discriminator, mainly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `marker_add`
    MarkerAdd,
    /// `marker_update`
    MarkerUpdate,
    /// `marker_delete`
    MarkerDelete,
    /// `presence_heartbeat`
    PresenceHeartbeat,
    /// `presence_leave`
    PresenceLeave,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkerAdd => "marker_add",
            Self::MarkerUpdate => "marker_update",
            Self::MarkerDelete => "marker_delete",
            Self::PresenceHeartbeat => "presence_heartbeat",
            Self::PresenceLeave => "presence_leave",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A marker was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMarker {
    /// Target floor plan
    pub floor_plan_id: FloorPlanId,
    /// Originating session
    pub client_id: SessionId,
    /// The new marker, under its wire id
    pub marker: Marker,
}

/// Fields of an existing marker changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMarker {
    /// Target floor plan
    pub floor_plan_id: FloorPlanId,
    /// Originating session
    pub client_id: SessionId,
    /// Marker being changed
    pub marker_id: MarkerId,
    /// The field assignments
    pub changes: MarkerChanges,
}

/// A marker was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMarker {
    /// Target floor plan
    pub floor_plan_id: FloorPlanId,
    /// Originating session
    pub client_id: SessionId,
    /// Marker being removed
    pub marker_id: MarkerId,
}

/// Who a user is, as shown to other operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUser {
    /// Account identifier
    pub user_id: UserId,
    /// Display name
    pub user_name: String,
    /// Optional role label (e.g. "safety officer")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

impl PresenceUser {
    /// Create a user without a role.
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            user_role: None,
        }
    }

    /// Set the role label.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }
}

/// Periodic liveness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceHeartbeat {
    /// Target floor plan
    pub floor_plan_id: FloorPlanId,
    /// The user sending the heartbeat
    pub user: PresenceUser,
    /// Whether the user is currently editing markers
    pub is_editing: bool,
}

/// A user left the floor plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceLeave {
    /// Target floor plan
    pub floor_plan_id: FloorPlanId,
    /// The user leaving
    pub user_id: UserId,
}
