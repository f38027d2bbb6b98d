//! # floorsync-client
//!
//! Session orchestration for collaborative floor-plan marker editing.
//!
//! This is the library a UI layer drives. It wraps the pure state from
//! `floorsync-core` with the I/O around it.
//!
//! ## Features
//!
//! - **Optimistic edits**: local changes render immediately and roll back on send failure
//! - **Conflict handling**: remote edits to dirty markers become conflicts under a configurable policy
//! - **Presence**: periodic heartbeats, stale-peer pruning, editing-mode flag
//! - **Transport Abstraction**: Pluggable room transport (in-process hub, mock)
//!
//! ## Example
//!
//! ```ignore
//! use floorsync_client::{FloorPlanSession, LocalHub, MockPersistence, SessionConfig};
//!
//! let hub = LocalHub::new();
//! let session = FloorPlanSession::new(
//!     Arc::new(hub.transport()),
//!     Arc::new(MockPersistence::new()),
//!     PresenceUser::new("u1", "Ana"),
//!     FloorPlanId::from("plan-1"),
//!     SessionConfig::default(),
//! );
//! session.connect("local").await?;
//! session.join().await?;
//!
//! let id = session.add_marker(MarkerDraft::new(MarkerType::Aed, "Lobby", 12.0, 40.0)).await?;
//! let snapshot = session.snapshot().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
mod clock;
pub mod config;
pub mod device;
pub mod error;
mod heartbeat;
pub mod persistence;
pub mod session;
pub mod transport;

pub use channel::RoomChannel;
pub use config::{ConfigError, SessionConfig};
pub use device::DevicePositionSync;
pub use error::ClientError;
pub use persistence::{
    DevicePositionApi, MarkerPersistence, MockDeviceApi, MockPersistence, PersistenceError,
};
pub use session::{FloorPlanSession, SessionSnapshot};
pub use transport::{
    HubTransport, LocalHub, MockTransport, Transport, TransportError, DEFAULT_ROOM_CAPACITY,
};
