//! Envelope - the wire format wrapper for all channel messages.

use serde::{Deserialize, Serialize};

use crate::{Message, SyncError, UserId};

/// Protocol version written into every envelope.
pub const PROTOCOL_VERSION: u8 = 1;

/// The envelope wraps every channel message with sender metadata.
///
/// Frames are MessagePack with named fields, so the inner `type` tag of
/// [`Message`] survives the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version (currently 1)
    pub version: u8,
    /// The acting user
    pub user_id: UserId,
    /// Unix timestamp (milliseconds) - informational only, not trusted
    pub sent_at: u64,
    /// The message itself
    pub message: Message,
}

impl Envelope {
    /// Create a new envelope for sending.
    pub fn new(user_id: UserId, sent_at: u64, message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            user_id,
            sent_at,
            message,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec_named(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    ///
    /// Frames from a newer protocol version are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let envelope: Self = rmp_serde::from_slice(bytes).map_err(SyncError::Deserialization)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(SyncError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope)
    }
}
