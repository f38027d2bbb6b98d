//! Error types for floorsync.

use thiserror::Error;

/// Errors that can occur encoding, decoding or validating floorsync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Invalid protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Marker failed validation
    #[error("invalid marker {id}: {reason}")]
    InvalidMarker {
        /// The offending marker
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
