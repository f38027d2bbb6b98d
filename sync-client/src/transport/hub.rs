//! In-process channel hub.
//!
//! [`LocalHub`] keeps one tokio broadcast group per room; every
//! [`HubTransport`] created from it behaves like a client of a hosted
//! channel service: frames sent to a room reach every member, the sender
//! included. Used by the CLI simulation and multi-client tests.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Frames buffered per room before slow members start lagging.
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

type Frame = Arc<Vec<u8>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Room {
    sender: broadcast::Sender<Frame>,
    members: usize,
}

/// Room registry shared by every transport of one hub.
///
/// A room exists while it has members; the last member leaving removes it.
#[derive(Debug, Clone)]
pub struct LocalHub {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
    capacity: usize,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHub {
    /// Create a hub with the default room capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Create a hub with a custom per-room buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Create a new client transport attached to this hub.
    pub fn transport(&self) -> HubTransport {
        HubTransport::new(self.clone())
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }

    /// Number of members subscribed to a room.
    pub fn member_count(&self, room: &str) -> usize {
        lock(&self.rooms)
            .get(room)
            .map(|r| r.members)
            .unwrap_or(0)
    }

    fn subscribe(&self, room: &str) -> broadcast::Receiver<Frame> {
        let mut rooms = lock(&self.rooms);
        let entry = rooms.entry(room.to_string()).or_insert_with(|| Room {
            sender: broadcast::channel(self.capacity).0,
            members: 0,
        });
        entry.members += 1;
        entry.sender.subscribe()
    }

    fn release(&self, room: &str) {
        let mut rooms = lock(&self.rooms);
        if let Some(entry) = rooms.get_mut(room) {
            entry.members = entry.members.saturating_sub(1);
            if entry.members == 0 {
                rooms.remove(room);
                tracing::debug!("Room {} closed", room);
            }
        }
    }

    fn publish(&self, room: &str, frame: Frame) -> usize {
        let rooms = lock(&self.rooms);
        match rooms.get(room) {
            // No receivers is not an error: nobody else is listening.
            Some(entry) => entry.sender.send(frame).unwrap_or(0),
            None => 0,
        }
    }
}

enum InboxItem {
    Frame(Vec<u8>),
    Closed,
}

#[derive(Default)]
struct HubState {
    connected: bool,
    // One forwarding task per joined room.
    rooms: HashMap<String, JoinHandle<()>>,
}

/// A client connection to a [`LocalHub`].
pub struct HubTransport {
    hub: LocalHub,
    state: Mutex<HubState>,
    inbox_tx: mpsc::UnboundedSender<InboxItem>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboxItem>>,
}

impl std::fmt::Debug for HubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("HubTransport")
            .field("connected", &state.connected)
            .field("rooms", &state.rooms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HubTransport {
    fn new(hub: LocalHub) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            hub,
            state: Mutex::new(HubState::default()),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
        }
    }

    /// Rooms currently joined.
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = lock(&self.state).rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Drop the connection as if the network went away.
    ///
    /// Pending `recv()` calls return `ConnectionClosed`.
    pub fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        for (room, forwarder) in state.rooms.drain() {
            forwarder.abort();
            self.hub.release(&room);
        }
        let _ = self.inbox_tx.send(InboxItem::Closed);
    }
}

impl Drop for HubTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait]
impl Transport for HubTransport {
    async fn connect(&self, _address: &str) -> Result<(), TransportError> {
        // Drop anything left over from a previous connection.
        if let Ok(mut inbox) = self.inbox_rx.try_lock() {
            while inbox.try_recv().is_ok() {}
        }
        lock(&self.state).connected = true;
        Ok(())
    }

    async fn join_room(&self, room: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.rooms.contains_key(room) {
            return Ok(());
        }

        let mut subscription = self.hub.subscribe(room);
        let inbox = self.inbox_tx.clone();
        let room_name = room.to_string();
        let forwarder = tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(frame) => {
                        if inbox.send(InboxItem::Frame(frame.to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Room {} lagged, {} frames dropped", room_name, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        state.rooms.insert(room.to_string(), forwarder);
        Ok(())
    }

    async fn leave_room(&self, room: &str) -> Result<(), TransportError> {
        if let Some(forwarder) = lock(&self.state).rooms.remove(room) {
            forwarder.abort();
            self.hub.release(room);
        }
        Ok(())
    }

    async fn send(&self, room: &str, data: &[u8]) -> Result<(), TransportError> {
        {
            let state = lock(&self.state);
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            if !state.rooms.contains_key(room) {
                return Err(TransportError::SendFailed(format!("not a member of room {room}")));
            }
        }
        let delivered = self.hub.publish(room, Arc::new(data.to_vec()));
        tracing::trace!("Frame of {} bytes delivered to {} members of {}", data.len(), delivered, room);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut inbox = self.inbox_rx.lock().await;
        match inbox.recv().await {
            Some(InboxItem::Frame(frame)) => Ok(frame),
            Some(InboxItem::Closed) | None => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.disconnect();
        Ok(())
    }
}
