//! # sync-types
//!
//! Wire format and data model types for floorsync, the collaborative
//! floor-plan marker synchronization engine.
//!
//! This crate provides the foundational types used across all floorsync crates:
//! - [`MarkerId`], [`FloorPlanId`], [`UserId`], [`SessionId`], [`ClientToken`] - Identity types
//! - [`Marker`], [`MarkerChanges`], [`KeyLocation`] - The marker data model
//! - [`Envelope`] - Frame wrapper with sender metadata
//! - [`Message`] - Channel messages (marker add/update/delete, presence)
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod marker;
mod messages;

pub use envelope::{Envelope, PROTOCOL_VERSION};
pub use error::SyncError;
pub use ids::{ClientToken, DeviceId, FloorPlanId, MarkerId, SessionId, UserId};
pub use marker::{
    clamp_percent, FieldChange, KeyLocation, Marker, MarkerCategory, MarkerChanges, MarkerDraft,
    MarkerField, MarkerType, PERCENT_MAX, PERCENT_MIN,
};
pub use messages::{
    AddMarker, DeleteMarker, Message, MessageKind, PresenceHeartbeat, PresenceLeave, PresenceUser,
    UpdateMarker,
};
