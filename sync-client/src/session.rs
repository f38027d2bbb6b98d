//! FloorPlanSession - the sync orchestrator for one floor plan.
//!
//! This module provides [`FloorPlanSession`], the API a UI layer uses to
//! edit markers collaboratively.
//!
//! # Architecture
//!
//! The session owns the pure marker store and presence tracker (from
//! sync-core) behind one async mutex and performs the I/O around them:
//!
//! ```text
//! UI → FloorPlanSession → RoomChannel → Transport → channel service
//!            ↓                                 ↓
//!      sync-core (store, presence)     receiver task → handle_envelope
//! ```
//!
//! Local edits apply immediately. The network send happens with the lock
//! released; on failure the edit is rolled back from its snapshot and the
//! error is stored for display. Every continuation re-checks the session
//! epoch, which is bumped on each floor plan switch, so late results never
//! touch the new floor plan's state.
//!
//! # Example
//!
//! ```ignore
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
//! let id = session.add_marker(MarkerDraft::new(MarkerType::Aed, "Lobby", 12.0, 40.0)).await?;
//! session.save().await?;
//! ```

use std::sync::{Arc, Weak};

use floorsync_core::{
    ConflictType, MarkerConflict, MarkerStore, OptimisticMarker, PresenceEntry, PresenceTracker,
    RemoteOrigin, RemoteOutcome, Resolution,
};
use floorsync_types::{
    Envelope, FloorPlanId, Marker, MarkerChanges, MarkerDraft, MarkerId, Message, PresenceUser,
    SessionId,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::RoomChannel;
use crate::clock::{millis, unix_millis, SessionClock};
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::heartbeat::spawn_heartbeat_task;
use crate::persistence::MarkerPersistence;
use crate::transport::Transport;

/// Everything a UI needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// The floor plan currently loaded
    pub floor_plan_id: FloorPlanId,
    /// Whether the transport is connected
    pub is_connected: bool,
    /// Whether any send or save is in flight
    pub is_syncing: bool,
    /// Whether there are unsaved local changes
    pub is_dirty: bool,
    /// Whether the local user is in editing mode
    pub is_editing: bool,
    /// Users on the floor plan, self included
    pub active_users: Vec<PresenceEntry>,
    /// Confirmed and pending markers
    pub markers: Vec<Marker>,
    /// Number of optimistic adds awaiting confirmation
    pub pending: usize,
    /// The selected marker
    pub selected: Option<MarkerId>,
    /// Conflicts waiting for a decision
    pub conflicts: Vec<MarkerConflict>,
    /// Last operation error, until dismissed
    pub error: Option<String>,
}

pub(crate) struct SessionState {
    epoch: u64,
    store: MarkerStore,
    presence: PresenceTracker,
    in_flight: usize,
    error: Option<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionState {
    fn new(
        floor_plan_id: FloorPlanId,
        session_id: SessionId,
        user: &PresenceUser,
        config: &SessionConfig,
        epoch: u64,
    ) -> Self {
        Self {
            epoch,
            store: MarkerStore::new(floor_plan_id.clone(), session_id).with_strategy(config.strategy),
            presence: PresenceTracker::new(
                user.clone(),
                floor_plan_id,
                millis(config.presence_timeout()),
            ),
            in_flight: 0,
            error: None,
            tasks: Vec::new(),
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Close an in-flight operation started under `epoch`.
    fn finish(&mut self, epoch: u64) -> Result<(), ClientError> {
        if self.epoch != epoch {
            tracing::warn!("Discarding result from a previous floor plan");
            return Err(ClientError::FloorPlanChanged);
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        Ok(())
    }

    fn expire_pending(&mut self, now: u64, timeout_ms: u64) -> Vec<OptimisticMarker> {
        let expired = self.store.expire_pending(now, timeout_ms);
        if !expired.is_empty() {
            tracing::warn!("Rolled back {} unconfirmed marker(s)", expired.len());
            self.error = Some(format!(
                "{} marker(s) were not confirmed in time and were rolled back",
                expired.len()
            ));
        }
        expired
    }
}

pub(crate) struct SessionInner<T: Transport, P: MarkerPersistence> {
    channel: RoomChannel<T>,
    persistence: Arc<P>,
    config: SessionConfig,
    user: PresenceUser,
    clock: SessionClock,
    state: Mutex<SessionState>,
}

impl<T: Transport, P: MarkerPersistence> Drop for SessionInner<T, P> {
    fn drop(&mut self) {
        self.state.get_mut().abort_tasks();
    }
}

impl<T: Transport + 'static, P: MarkerPersistence + 'static> SessionInner<T, P> {
    /// One heartbeat period: prune peers, expire pending adds, announce self.
    ///
    /// Returns `false` once the session has moved to another floor plan.
    pub(crate) async fn heartbeat_tick(&self, epoch: u64) -> bool {
        let now = self.clock.now();
        let heartbeat = {
            let mut st = self.state.lock().await;
            if st.epoch != epoch {
                return false;
            }
            for user_id in st.presence.prune_stale(now) {
                tracing::info!("Presence of {} timed out", user_id);
            }
            st.expire_pending(now, millis(self.config.pending_timeout()));
            if !st.presence.is_joined() {
                return true;
            }
            st.presence.heartbeat(now)
        };

        if self.channel.is_connected() {
            if let Err(e) = self.channel.send_presence_heartbeat(heartbeat).await {
                tracing::warn!("Heartbeat failed: {}", e);
            }
        }
        true
    }

    /// Route one inbound envelope to the store or presence tracker.
    async fn handle_envelope(&self, envelope: Envelope) -> Option<RemoteOutcome> {
        let now = self.clock.now();
        let mut st = self.state.lock().await;

        if envelope.message.floor_plan_id() != st.store.floor_plan_id() {
            tracing::debug!(
                "Ignoring {} for floor plan {}",
                envelope.message.kind(),
                envelope.message.floor_plan_id()
            );
            return None;
        }

        let user_id = envelope.user_id;
        let origin = |session_id: SessionId| RemoteOrigin {
            user_id: user_id.clone(),
            session_id,
            received_at: unix_millis(),
        };

        let (marker_id, outcome) = match envelope.message {
            Message::MarkerAdd(add) => {
                let marker_id = add.marker.id.clone();
                let outcome = st
                    .store
                    .handle_remote_marker_added(add.marker, &origin(add.client_id));
                (marker_id, outcome)
            }
            Message::MarkerUpdate(update) => {
                let outcome = st.store.handle_remote_marker_updated(
                    &update.marker_id,
                    &update.changes,
                    &origin(update.client_id),
                );
                (update.marker_id, outcome)
            }
            Message::MarkerDelete(delete) => {
                let outcome = st
                    .store
                    .handle_remote_marker_deleted(&delete.marker_id, &origin(delete.client_id));
                (delete.marker_id, outcome)
            }
            Message::PresenceHeartbeat(heartbeat) => {
                st.presence.handle_heartbeat(&heartbeat, now);
                return None;
            }
            Message::PresenceLeave(leave) => {
                if st.presence.handle_leave(&leave) {
                    tracing::info!("{} left floor plan {}", leave.user_id, leave.floor_plan_id);
                }
                return None;
            }
        };

        match outcome {
            RemoteOutcome::Conflicted {
                conflict_type,
                remote_applied,
            } => tracing::info!(
                "Conflict on marker {} with {} ({:?}, remote applied: {})",
                marker_id,
                user_id,
                conflict_type,
                remote_applied
            ),
            RemoteOutcome::Ignored(reason) => {
                tracing::debug!("Remote event for marker {} ignored: {:?}", marker_id, reason)
            }
            RemoteOutcome::Applied => {
                tracing::debug!("Applied remote change to marker {} from {}", marker_id, user_id)
            }
        }
        Some(outcome)
    }
}

fn spawn_receiver_task<T, P>(
    session: Weak<SessionInner<T, P>>,
    channel: RoomChannel<T>,
) -> JoinHandle<()>
where
    T: Transport + 'static,
    P: MarkerPersistence + 'static,
{
    tokio::spawn(async move {
        loop {
            match channel.recv_envelope().await {
                Ok(envelope) => {
                    let Some(session) = session.upgrade() else {
                        break;
                    };
                    session.handle_envelope(envelope).await;
                }
                Err(ClientError::Wire(e)) => {
                    tracing::warn!("Dropping undecodable frame: {}", e);
                }
                Err(e) => {
                    tracing::debug!("Receiver stopped: {}", e);
                    break;
                }
            }
        }
    })
}

/// A collaborative editing session on one floor plan at a time.
///
/// Cheap to clone; clones share the same session.
pub struct FloorPlanSession<T: Transport, P: MarkerPersistence> {
    inner: Arc<SessionInner<T, P>>,
}

impl<T: Transport, P: MarkerPersistence> Clone for FloorPlanSession<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static, P: MarkerPersistence + 'static> FloorPlanSession<T, P> {
    /// Create a session for `user` on a floor plan. Nothing is sent until
    /// [`join`](Self::join).
    pub fn new(
        transport: Arc<T>,
        persistence: Arc<P>,
        user: PresenceUser,
        floor_plan_id: FloorPlanId,
        config: SessionConfig,
    ) -> Self {
        let session_id = SessionId::new();
        let channel = RoomChannel::new(transport, user.user_id.clone(), session_id);
        let state = SessionState::new(floor_plan_id, session_id, &user, &config, 0);
        Self {
            inner: Arc::new(SessionInner {
                channel,
                persistence,
                config,
                user,
                clock: SessionClock::new(),
                state: Mutex::new(state),
            }),
        }
    }

    /// This session's identity, stamped on every outbound marker message.
    pub fn session_id(&self) -> SessionId {
        self.inner.channel.session_id()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The local user.
    pub fn user(&self) -> &PresenceUser {
        &self.inner.user
    }

    /// The floor plan currently loaded.
    pub async fn floor_plan_id(&self) -> FloorPlanId {
        self.inner.state.lock().await.store.floor_plan_id().clone()
    }

    /// Whether any send or save is in flight.
    pub async fn is_syncing(&self) -> bool {
        self.inner.state.lock().await.in_flight > 0
    }

    /// Read the marker store.
    pub async fn read_store<R>(&self, f: impl FnOnce(&MarkerStore) -> R) -> R {
        f(&self.inner.state.lock().await.store)
    }

    /// Current UI state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.state.lock().await;
        SessionSnapshot {
            floor_plan_id: st.store.floor_plan_id().clone(),
            is_connected: self.inner.channel.is_connected(),
            is_syncing: st.in_flight > 0,
            is_dirty: st.store.is_dirty(),
            is_editing: st.presence.is_editing(),
            active_users: st.presence.active_users(),
            markers: st.store.visible_markers().into_iter().cloned().collect(),
            pending: st.store.optimistic_markers().len(),
            selected: st.store.selected_marker().map(|m| m.id.clone()),
            conflicts: st.store.open_conflicts().into_iter().cloned().collect(),
            error: st.error.clone(),
        }
    }

    /// Clear the error banner.
    pub async fn dismiss_error(&self) {
        self.inner.state.lock().await.error = None;
    }

    async fn set_error(&self, message: String) {
        self.inner.state.lock().await.error = Some(message);
    }

    // ===========================================
    // Connection and room lifecycle
    // ===========================================

    /// Connect the transport.
    pub async fn connect(&self, address: &str) -> Result<(), ClientError> {
        if let Err(e) = self.inner.channel.transport().connect(address).await {
            tracing::error!("Connection to {} failed: {}", address, e);
            self.set_error(format!("Connection failed: {e}")).await;
            return Err(e.into());
        }
        tracing::info!("Connected to {}", address);
        Ok(())
    }

    /// Close the transport. Local state is kept.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.channel.transport().close().await?;
        tracing::info!("Disconnected");
        Ok(())
    }

    /// Join the floor plan's room and start the receiver and heartbeat tasks.
    pub async fn join(&self) -> Result<(), ClientError> {
        let floor_plan_id = self.floor_plan_id().await;
        if let Err(e) = self.inner.channel.join(&floor_plan_id).await {
            self.set_error(format!("Failed to join floor plan {floor_plan_id}: {e}"))
                .await;
            return Err(e);
        }

        let heartbeat = {
            let mut st = self.inner.state.lock().await;
            st.abort_tasks();
            let weak = Arc::downgrade(&self.inner);
            let receiver = spawn_receiver_task(weak.clone(), self.inner.channel.clone());
            let heartbeat =
                spawn_heartbeat_task(weak, self.inner.config.heartbeat_interval(), st.epoch);
            st.tasks.push(receiver);
            st.tasks.push(heartbeat);
            st.presence.join(self.inner.clock.now())
        };

        tracing::info!(
            "{} joined floor plan {}",
            self.inner.user.user_name,
            floor_plan_id
        );
        if let Err(e) = self.inner.channel.send_presence_heartbeat(heartbeat).await {
            tracing::warn!("Initial heartbeat failed: {}", e);
        }
        Ok(())
    }

    /// Stop background tasks, announce departure and leave the room.
    pub async fn leave(&self) -> Result<(), ClientError> {
        let (floor_plan_id, leave) = {
            let mut st = self.inner.state.lock().await;
            st.abort_tasks();
            (st.store.floor_plan_id().clone(), st.presence.leave())
        };
        let Some(leave) = leave else {
            return Ok(());
        };

        if self.inner.channel.is_connected() {
            if let Err(e) = self.inner.channel.send_presence_leave(leave).await {
                tracing::warn!("Presence leave failed: {}", e);
            }
            self.inner.channel.leave(&floor_plan_id).await?;
        }
        tracing::info!("Left floor plan {}", floor_plan_id);
        Ok(())
    }

    /// Tear down the current floor plan and start over on another one.
    ///
    /// Operations still in flight for the old floor plan complete with
    /// [`ClientError::FloorPlanChanged`].
    pub async fn switch_floor_plan(&self, floor_plan_id: FloorPlanId) -> Result<(), ClientError> {
        let was_joined = self.inner.state.lock().await.presence.is_joined();
        if let Err(e) = self.leave().await {
            tracing::warn!("Leaving previous floor plan failed: {}", e);
        }

        {
            let mut st = self.inner.state.lock().await;
            let epoch = st.epoch + 1;
            *st = SessionState::new(
                floor_plan_id.clone(),
                self.session_id(),
                &self.inner.user,
                &self.inner.config,
                epoch,
            );
        }
        tracing::info!("Switched to floor plan {}", floor_plan_id);

        if was_joined && self.inner.channel.is_connected() {
            self.join().await?;
        }
        Ok(())
    }

    /// Replace the markers with an authoritative snapshot.
    pub async fn load_markers(&self, markers: Vec<Marker>) {
        let mut st = self.inner.state.lock().await;
        tracing::debug!("Loaded {} markers", markers.len());
        st.store.load(markers);
    }

    // ===========================================
    // Marker operations
    // ===========================================

    /// Add a marker optimistically and broadcast it.
    ///
    /// On send failure the marker is rolled back and the error surfaced.
    /// While disconnected the marker is only added locally.
    pub async fn add_marker(&self, draft: MarkerDraft) -> Result<MarkerId, ClientError> {
        let connected = self.inner.channel.is_connected();
        let marker_id = MarkerId::generate();
        let marker = Marker::from_draft(marker_id.clone(), draft);

        let (epoch, floor_plan_id, token) = {
            let mut st = self.inner.state.lock().await;
            let token = connected
                .then(|| st.store.add_optimistic_marker(marker.clone(), self.inner.clock.now()));
            st.store.put_marker(marker.clone());
            st.store.select_marker(Some(marker_id.clone()));
            let Some(token) = token else {
                tracing::debug!("Offline: marker {} kept locally", marker_id);
                return Ok(marker_id);
            };
            st.in_flight += 1;
            (st.epoch, st.store.floor_plan_id().clone(), token)
        };

        let result = self
            .inner
            .channel
            .send_marker_add(&floor_plan_id, &marker)
            .await;

        let mut st = self.inner.state.lock().await;
        st.finish(epoch)?;
        match result {
            Ok(()) => st
                .store
                .confirm_optimistic_marker(token, marker_id.clone())
                .ok_or_else(|| {
                    tracing::warn!("Marker {} was confirmed after it expired", marker_id);
                    ClientError::OperationExpired
                }),
            Err(e) => {
                st.store.rollback_optimistic_marker(token);
                tracing::warn!("Add of marker {} failed, rolled back: {}", marker_id, e);
                st.error = Some(format!("Failed to add marker: {e}"));
                Err(e)
            }
        }
    }

    /// Change fields of a marker and broadcast the change.
    ///
    /// Unknown markers are a no-op. On send failure the marker is restored
    /// to its exact previous values.
    pub async fn update_marker(
        &self,
        marker_id: &MarkerId,
        changes: MarkerChanges,
    ) -> Result<(), ClientError> {
        let connected = self.inner.channel.is_connected();
        let (epoch, floor_plan_id, before) = {
            let mut st = self.inner.state.lock().await;
            let Some(before) = st.store.update_marker(marker_id, &changes) else {
                tracing::debug!("Update for unknown marker {} ignored", marker_id);
                return Ok(());
            };
            if !connected {
                return Ok(());
            }
            st.in_flight += 1;
            (st.epoch, st.store.floor_plan_id().clone(), before)
        };

        let result = self
            .inner
            .channel
            .send_marker_update(&floor_plan_id, marker_id, &changes)
            .await;

        let mut st = self.inner.state.lock().await;
        st.finish(epoch)?;
        if let Err(e) = result {
            if st.store.marker(marker_id).is_some() {
                st.store.put_marker(before);
            }
            tracing::warn!("Update of marker {} failed, rolled back: {}", marker_id, e);
            st.error = Some(format!("Failed to update marker: {e}"));
            return Err(e);
        }
        Ok(())
    }

    /// Delete a marker and broadcast the removal.
    ///
    /// On send failure the marker is reinstated at its previous position.
    pub async fn delete_marker(&self, marker_id: &MarkerId) -> Result<(), ClientError> {
        let connected = self.inner.channel.is_connected();
        let (epoch, floor_plan_id, removed) = {
            let mut st = self.inner.state.lock().await;
            let Some(removed) = st.store.delete_marker(marker_id) else {
                tracing::debug!("Delete for unknown marker {} ignored", marker_id);
                return Ok(());
            };
            if !connected {
                return Ok(());
            }
            st.in_flight += 1;
            (st.epoch, st.store.floor_plan_id().clone(), removed)
        };

        let result = self
            .inner
            .channel
            .send_marker_delete(&floor_plan_id, marker_id)
            .await;

        let mut st = self.inner.state.lock().await;
        st.finish(epoch)?;
        if let Err(e) = result {
            st.store.restore_marker(removed);
            tracing::warn!("Delete of marker {} failed, restored: {}", marker_id, e);
            st.error = Some(format!("Failed to delete marker: {e}"));
            return Err(e);
        }
        Ok(())
    }

    /// Select a marker, or clear the selection.
    pub async fn select_marker(&self, marker_id: Option<MarkerId>) {
        self.inner.state.lock().await.store.select_marker(marker_id);
    }

    /// Toggle editing mode and announce it with an immediate heartbeat.
    pub async fn set_editing(&self, is_editing: bool) -> Result<(), ClientError> {
        let heartbeat = {
            let mut st = self.inner.state.lock().await;
            st.presence.set_editing_mode(is_editing);
            if !st.presence.is_joined() {
                return Ok(());
            }
            st.presence.heartbeat(self.inner.clock.now())
        };

        if !self.inner.channel.is_connected() {
            return Ok(());
        }
        if let Err(e) = self.inner.channel.send_presence_heartbeat(heartbeat).await {
            tracing::warn!("Editing-mode heartbeat failed: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Resolve the open conflict on a marker.
    ///
    /// When the local side wins (`keep_local`, or `merge` on a position
    /// conflict) the winning values are broadcast so peers converge.
    pub async fn resolve_conflict(
        &self,
        marker_id: &MarkerId,
        resolution: Resolution,
    ) -> Result<MarkerConflict, ClientError> {
        let connected = self.inner.channel.is_connected();
        let (resolved, winner, epoch, floor_plan_id) = {
            let mut st = self.inner.state.lock().await;
            let resolved = st.store.resolve_conflict(marker_id, resolution)?;
            let local_wins = match resolution {
                Resolution::KeepLocal => true,
                Resolution::Merge => resolved.conflict_type == ConflictType::Position,
                Resolution::AcceptRemote => false,
            };
            let winner = if local_wins && connected {
                st.store.marker(marker_id).cloned()
            } else {
                None
            };
            if winner.is_some() {
                st.in_flight += 1;
            }
            (resolved, winner, st.epoch, st.store.floor_plan_id().clone())
        };
        tracing::info!("Conflict on marker {} resolved: {:?}", marker_id, resolution);

        let Some(winner) = winner else {
            return Ok(resolved);
        };
        let result = if resolved.conflict_type == ConflictType::Deletion {
            // Peers already deleted it; re-announce the marker.
            self.inner
                .channel
                .send_marker_add(&floor_plan_id, &winner)
                .await
        } else {
            self.inner
                .channel
                .send_marker_update(&floor_plan_id, marker_id, &MarkerChanges::replace_with(&winner))
                .await
        };

        let mut st = self.inner.state.lock().await;
        st.finish(epoch)?;
        if let Err(e) = result {
            tracing::warn!("Broadcast of resolution for {} failed: {}", marker_id, e);
            st.error = Some(format!("Failed to broadcast conflict resolution: {e}"));
            return Err(e);
        }
        Ok(resolved)
    }

    /// Persist the confirmed markers.
    ///
    /// On failure the error is surfaced and the store stays dirty.
    pub async fn save(&self) -> Result<(), ClientError> {
        let (epoch, floor_plan_id, payload) = {
            let mut st = self.inner.state.lock().await;
            let payload = match st.store.save_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    st.error = Some(format!("Failed to save: {e}"));
                    return Err(e.into());
                }
            };
            st.in_flight += 1;
            (st.epoch, st.store.floor_plan_id().clone(), payload)
        };

        let result = self
            .inner
            .persistence
            .replace_key_locations(&floor_plan_id, &payload)
            .await;

        let mut st = self.inner.state.lock().await;
        st.finish(epoch)?;
        match result {
            Ok(()) => {
                st.store.mark_saved();
                tracing::info!(
                    "Saved {} key locations for floor plan {}",
                    payload.len(),
                    floor_plan_id
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Save of floor plan {} failed: {}", floor_plan_id, e);
                st.error = Some(format!("Failed to save: {e}"));
                Err(e.into())
            }
        }
    }

    /// Roll back optimistic adds older than the pending timeout.
    ///
    /// The heartbeat task does this every period; exposed for callers that
    /// drive time themselves.
    pub async fn expire_pending(&self) -> Vec<OptimisticMarker> {
        let now = self.inner.clock.now();
        let timeout = millis(self.inner.config.pending_timeout());
        self.inner.state.lock().await.expire_pending(now, timeout)
    }

    /// Decode and apply one inbound frame.
    ///
    /// Returns how the store handled a marker event, or `None` for presence
    /// traffic and frames for other floor plans.
    pub async fn handle_inbound(&self, frame: &[u8]) -> Result<Option<RemoteOutcome>, ClientError> {
        let envelope = Envelope::from_bytes(frame)?;
        Ok(self.inner.handle_envelope(envelope).await)
    }
}
