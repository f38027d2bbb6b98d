//! Client error types.

use floorsync_core::StoreError;
use floorsync_types::SyncError;
use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::transport::TransportError;

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encoding or decoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] SyncError),

    /// The marker store rejected the operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Saving failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The session switched floor plans while the operation was in flight;
    /// its result was discarded.
    #[error("floor plan changed while the operation was in flight")]
    FloorPlanChanged,

    /// The pending operation was rolled back before it completed.
    #[error("operation expired before confirmation")]
    OperationExpired,

    /// The session has not joined a floor plan room.
    #[error("not joined to a floor plan")]
    NotJoined,
}
