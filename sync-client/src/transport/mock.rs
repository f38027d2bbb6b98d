//! Mock transport for testing.
//!
//! Allows queueing inbound frames and capturing sent frames per room.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock transport for testing.
///
/// Sent frames are recorded with their room. `recv()` pops queued frames
/// and reports `ConnectionClosed` once the queue is empty.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    rooms: Vec<String>,
    sent_messages: Vec<(String, Vec<u8>)>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_join: Option<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that is already connected.
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.lock().connected = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame to be returned by the next `recv()` call.
    pub fn queue_response(&self, data: Vec<u8>) {
        self.lock().receive_queue.push_back(data);
    }

    /// All frames sent, in order, without their room.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.lock().sent_messages.iter().map(|(_, data)| data.clone()).collect()
    }

    /// Frames sent to one room.
    pub fn sent_to(&self, room: &str) -> Vec<Vec<u8>> {
        self.lock()
            .sent_messages
            .iter()
            .filter(|(r, _)| r == room)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// The last frame sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.lock().sent_messages.last().map(|(_, data)| data.clone())
    }

    /// Rooms currently joined.
    pub fn rooms(&self) -> Vec<String> {
        self.lock().rooms.clone()
    }

    /// The address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next join_room() to fail with the given error.
    pub fn fail_next_join(&self, error: &str) {
        self.lock().fail_next_join = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Drop the connection as if the network went away.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.connected = false;
        inner.rooms.clear();
    }

    /// Clear all state (frames, queue, rooms, connection).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn join_room(&self, room: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(reason) = inner.fail_next_join.take() {
            return Err(TransportError::JoinFailed {
                room: room.to_string(),
                reason,
            });
        }

        if !inner.rooms.iter().any(|r| r == room) {
            inner.rooms.push(room.to_string());
        }
        Ok(())
    }

    async fn leave_room(&self, room: &str) -> Result<(), TransportError> {
        self.lock().rooms.retain(|r| r != room);
        Ok(())
    }

    async fn send(&self, room: &str, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push((room.to_string(), data.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        inner
            .receive_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.disconnect();
        Ok(())
    }
}
