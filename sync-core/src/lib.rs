//! # sync-core
//!
//! Pure logic for floorsync (no I/O, instant tests).
//!
//! This crate implements the marker store, conflict policies, presence
//! tracking and device placements without any network or disk I/O.
//! Time is always passed in as milliseconds, so every transition is
//! deterministic and testable without a runtime.
//!
//! The actual I/O (channel, persistence, timers) is performed by
//! `sync-client`, which drives these reducers and ships the messages they
//! produce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod device;
pub mod presence;
pub mod store;

pub use conflict::{
    AutoResolution, ConflictResolutionStrategy, ConflictType, MarkerConflict, Resolution,
};
pub use device::{DevicePlacement, DevicePositions, MoveToken};
pub use presence::{PresenceEntry, PresenceTracker};
pub use store::{
    IgnoreReason, MarkerStore, OptimisticMarker, RemoteOrigin, RemoteOutcome, RemovedMarker,
    StoreError,
};
