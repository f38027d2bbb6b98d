//! Transport abstraction for floorsync.
//!
//! This module provides a pluggable, room-oriented channel layer that
//! abstracts the underlying real-time service (a hosted channel service,
//! an in-process hub, a mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `join_room()` / `leave_room()` manage room membership (one room per floor plan)
//! - `send()` broadcasts envelope bytes to every member of a room, sender included
//! - `recv()` receives envelope bytes from any joined room
//! - `close()` gracefully terminates
//!
//! # Example
//!
//! ```ignore
//! let hub = LocalHub::new();
//! let transport = hub.transport();
//! transport.connect("local").await?;
//! transport.join_room("plan-1").await?;
//! transport.send("plan-1", &envelope_bytes).await?;
//! let frame = transport.recv().await?;
//! ```

mod hub;
mod mock;

pub use hub::{HubTransport, LocalHub, DEFAULT_ROOM_CAPACITY};
pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Joining a room failed.
    #[error("failed to join room {room}: {reason}")]
    JoinFailed {
        /// The room
        room: String,
        /// Why it failed
        reason: String,
    },

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for sending and receiving floorsync channel frames.
///
/// Implementations handle the underlying connection mechanism and room
/// fan-out. Frames are opaque bytes (encoded envelopes).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the channel service identified by the given address.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Subscribe to a room. Joining a room twice is a no-op.
    async fn join_room(&self, room: &str) -> Result<(), TransportError>;

    /// Unsubscribe from a room. Leaving a room not joined is a no-op.
    async fn leave_room(&self, room: &str) -> Result<(), TransportError>;

    /// Broadcast bytes to a joined room.
    async fn send(&self, room: &str, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next frame from any joined room.
    ///
    /// Blocks until data is available or the connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
