//! Marker store for one floor plan.
//!
//! The store is the single source of truth for the markers of the floor
//! plan currently loaded in a session: confirmed markers, in-flight
//! optimistic markers, detected conflicts and the active resolution policy.
//! It performs no I/O; every operation is a synchronous reducer and time is
//! passed in explicitly (milliseconds).
//!
//! ## Dirty tracking
//!
//! A marker is *dirty* while it carries local edits that have not been
//! reconciled with authoritative state. Remote updates to clean markers
//! apply without ceremony; only dirty markers can produce conflicts.
//! A marker becomes clean when a save succeeds ([`MarkerStore::mark_saved`]),
//! when its optimistic add is confirmed, or when the remote version is
//! adopted (by policy or by [`Resolution::AcceptRemote`]).
//!
//! ## Echo suppression
//!
//! Every remote handler receives the originating [`SessionId`]. Events that
//! carry this store's own session id are echoes of local operations and are
//! ignored, which makes optimistic-then-confirm idempotent over a channel
//! that rebroadcasts to every room member.

use std::collections::HashSet;

use floorsync_types::{
    clamp_percent, ClientToken, FloorPlanId, KeyLocation, Marker, MarkerChanges, MarkerDraft, MarkerId,
    SessionId, SyncError, UserId,
};
use thiserror::Error;

use crate::conflict::{
    AutoResolution, ConflictResolutionStrategy, ConflictType, MarkerConflict, Resolution,
};

/// Errors returned by [`MarkerStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// There is no unresolved conflict for the marker.
    #[error("no open conflict for marker {0}")]
    ConflictNotFound(MarkerId),

    /// A marker failed validation.
    #[error(transparent)]
    InvalidMarker(#[from] SyncError),
}

/// A marker not yet confirmed by the authoritative store.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticMarker {
    /// Correlation token for the pending operation
    pub client_id: ClientToken,
    /// The marker under its provisional wire id
    pub marker: Marker,
    /// Client-local creation time (ms); ordering and expiry only
    pub timestamp: u64,
}

/// A marker removed by [`MarkerStore::delete_marker`], kept for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedMarker {
    /// Position the marker occupied in the confirmed list
    pub index: usize,
    /// The marker as it was before removal
    pub marker: Marker,
}

/// Who an inbound remote event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrigin {
    /// The remote actor
    pub user_id: UserId,
    /// The session that issued the operation
    pub session_id: SessionId,
    /// When the event was received (ms)
    pub received_at: u64,
}

/// Why a remote event left the store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event is the echo of one of this session's own operations.
    Echo,
    /// The marker does not exist locally.
    UnknownMarker,
    /// The marker is already represented locally.
    AlreadyPresent,
}

/// How the store handled a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The event was applied directly.
    Applied,
    /// The event was ignored.
    Ignored(IgnoreReason),
    /// The event collided with local edits and a conflict was recorded.
    Conflicted {
        /// Classification of the conflict
        conflict_type: ConflictType,
        /// Whether the active policy applied the remote side
        remote_applied: bool,
    },
}

/// Client-side state for one floor plan's markers.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    floor_plan_id: FloorPlanId,
    session_id: SessionId,
    markers: Vec<Marker>,
    optimistic: Vec<OptimisticMarker>,
    conflicts: Vec<MarkerConflict>,
    strategy: ConflictResolutionStrategy,
    selected: Option<MarkerId>,
    dirty_markers: HashSet<MarkerId>,
    unsaved: bool,
}

impl MarkerStore {
    /// Create an empty store for a floor plan, owned by the given session.
    pub fn new(floor_plan_id: FloorPlanId, session_id: SessionId) -> Self {
        Self {
            floor_plan_id,
            session_id,
            markers: Vec::new(),
            optimistic: Vec::new(),
            conflicts: Vec::new(),
            strategy: ConflictResolutionStrategy::default(),
            selected: None,
            dirty_markers: HashSet::new(),
            unsaved: false,
        }
    }

    /// Set the conflict resolution strategy.
    pub fn with_strategy(mut self, strategy: ConflictResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the marker set with an authoritative snapshot.
    ///
    /// Clears pending entries, selection and dirty state. Conflict history
    /// is kept. Duplicate ids keep the last occurrence.
    pub fn load(&mut self, markers: Vec<Marker>) {
        self.markers.clear();
        for marker in markers {
            self.upsert(marker);
        }
        self.optimistic.clear();
        self.selected = None;
        self.dirty_markers.clear();
        self.unsaved = false;
    }

    // ===========================================
    // Read accessors
    // ===========================================

    /// The floor plan this store belongs to.
    pub fn floor_plan_id(&self) -> &FloorPlanId {
        &self.floor_plan_id
    }

    /// The owning session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The active conflict resolution strategy.
    pub fn strategy(&self) -> ConflictResolutionStrategy {
        self.strategy
    }

    /// Change the conflict resolution strategy for future conflicts.
    pub fn set_strategy(&mut self, strategy: ConflictResolutionStrategy) {
        self.strategy = strategy;
    }

    /// Confirmed markers, in insertion order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Look up a confirmed marker.
    pub fn marker(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == *id)
    }

    /// Markers to render: confirmed ones plus pending optimistic ones.
    pub fn visible_markers(&self) -> Vec<&Marker> {
        let mut visible: Vec<&Marker> = self.markers.iter().collect();
        for pending in &self.optimistic {
            if self.index_of(&pending.marker.id).is_none() {
                visible.push(&pending.marker);
            }
        }
        visible
    }

    /// Pending optimistic markers.
    pub fn optimistic_markers(&self) -> &[OptimisticMarker] {
        &self.optimistic
    }

    /// Every conflict ever recorded, including resolved history.
    pub fn conflicts(&self) -> &[MarkerConflict] {
        &self.conflicts
    }

    /// Conflicts still waiting for a decision.
    pub fn open_conflicts(&self) -> Vec<&MarkerConflict> {
        self.conflicts.iter().filter(|c| c.is_open()).collect()
    }

    /// The unresolved conflict for a marker, if any.
    pub fn open_conflict(&self, id: &MarkerId) -> Option<&MarkerConflict> {
        self.conflicts
            .iter()
            .find(|c| c.is_open() && c.marker_id == *id)
    }

    /// Whether there are local changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.unsaved
    }

    /// Whether a marker carries unreconciled local edits.
    pub fn is_marker_dirty(&self, id: &MarkerId) -> bool {
        self.dirty_markers.contains(id)
    }

    /// The selected marker, if it still exists.
    pub fn selected_marker(&self) -> Option<&Marker> {
        let id = self.selected.as_ref()?;
        self.visible_markers().into_iter().find(|m| m.id == *id)
    }

    /// Select a marker (or clear the selection). Unknown ids clear it.
    pub fn select_marker(&mut self, id: Option<MarkerId>) {
        self.selected = id.filter(|id| self.visible_markers().iter().any(|m| m.id == *id));
    }

    // ===========================================
    // Local mutations
    // ===========================================

    /// Insert a new marker under a freshly generated id and select it.
    ///
    /// Callers clamp coordinates; no validation beyond shape is done.
    pub fn add_marker(&mut self, draft: MarkerDraft) -> MarkerId {
        let id = MarkerId::generate();
        self.markers.push(Marker::from_draft(id.clone(), draft));
        self.touch(&id);
        self.selected = Some(id.clone());
        id
    }

    /// Insert or replace a marker by id.
    pub fn put_marker(&mut self, marker: Marker) {
        let id = marker.id.clone();
        self.upsert(marker);
        self.touch(&id);
    }

    /// Merge field changes into a marker.
    ///
    /// Returns the pre-update snapshot, or `None` (state unchanged) if the
    /// marker does not exist.
    pub fn update_marker(&mut self, id: &MarkerId, changes: &MarkerChanges) -> Option<Marker> {
        let index = self.index_of(id)?;
        let before = self.markers[index].clone();
        changes.apply_to(&mut self.markers[index]);
        self.touch(id);
        Some(before)
    }

    /// Remove a marker, deselecting it if selected.
    pub fn delete_marker(&mut self, id: &MarkerId) -> Option<RemovedMarker> {
        let index = self.index_of(id)?;
        let marker = self.markers.remove(index);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.touch(id);
        Some(RemovedMarker { index, marker })
    }

    /// Reinstate a removed marker at its previous position.
    pub fn restore_marker(&mut self, removed: RemovedMarker) {
        let id = removed.marker.id.clone();
        match self.index_of(&id) {
            Some(existing) => self.markers[existing] = removed.marker,
            None => {
                let index = removed.index.min(self.markers.len());
                self.markers.insert(index, removed.marker);
            }
        }
        self.touch(&id);
    }

    // ===========================================
    // Optimistic lifecycle
    // ===========================================

    /// Track a marker whose add has not been confirmed yet.
    pub fn add_optimistic_marker(&mut self, marker: Marker, now: u64) -> ClientToken {
        let client_id = ClientToken::new();
        self.optimistic.push(OptimisticMarker {
            client_id,
            marker,
            timestamp: now,
        });
        client_id
    }

    /// Promote a pending marker into the confirmed list under `server_id`.
    ///
    /// A rendering copy under the provisional id is renamed in place so the
    /// store never holds two markers for one add. Returns `None` (no-op) if
    /// the token is unknown.
    pub fn confirm_optimistic_marker(
        &mut self,
        client_id: ClientToken,
        server_id: MarkerId,
    ) -> Option<MarkerId> {
        let pending_index = self.optimistic.iter().position(|o| o.client_id == client_id)?;
        let pending = self.optimistic.remove(pending_index);
        let provisional = pending.marker.id.clone();

        // Prefer the rendering copy: it carries edits made while pending.
        let (mut marker, slot) = match self.index_of(&provisional) {
            Some(index) => (self.markers.remove(index), Some(index)),
            None => (pending.marker, None),
        };
        marker.id = server_id.clone();

        match self.index_of(&server_id) {
            Some(existing) => self.markers[existing] = marker,
            None => match slot {
                Some(index) => self.markers.insert(index.min(self.markers.len()), marker),
                None => self.markers.push(marker),
            },
        }

        if self.selected.as_ref() == Some(&provisional) {
            self.selected = Some(server_id.clone());
        }
        self.dirty_markers.remove(&provisional);
        self.dirty_markers.remove(&server_id);
        self.unsaved = true;
        Some(server_id)
    }

    /// Discard a pending marker, including its rendering copy.
    pub fn rollback_optimistic_marker(&mut self, client_id: ClientToken) -> Option<OptimisticMarker> {
        let index = self.optimistic.iter().position(|o| o.client_id == client_id)?;
        let pending = self.optimistic.remove(index);
        let id = &pending.marker.id;
        if let Some(copy) = self.index_of(id) {
            self.markers.remove(copy);
        }
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.dirty_markers.remove(id);
        Some(pending)
    }

    /// Roll back every pending marker older than `timeout_ms`.
    pub fn expire_pending(&mut self, now: u64, timeout_ms: u64) -> Vec<OptimisticMarker> {
        let expired: Vec<ClientToken> = self
            .optimistic
            .iter()
            .filter(|o| now.saturating_sub(o.timestamp) >= timeout_ms)
            .map(|o| o.client_id)
            .collect();

        expired
            .into_iter()
            .filter_map(|token| self.rollback_optimistic_marker(token))
            .collect()
    }

    // ===========================================
    // Remote events
    // ===========================================

    /// Apply a marker added by another session.
    ///
    /// Adds never conflict: they only collide with existing ids, which are
    /// ignored.
    pub fn handle_remote_marker_added(
        &mut self,
        mut marker: Marker,
        origin: &RemoteOrigin,
    ) -> RemoteOutcome {
        if self.is_echo(origin) {
            return RemoteOutcome::Ignored(IgnoreReason::Echo);
        }
        let already_present = self.index_of(&marker.id).is_some()
            || self.optimistic.iter().any(|o| o.marker.id == marker.id);
        if already_present {
            return RemoteOutcome::Ignored(IgnoreReason::AlreadyPresent);
        }
        marker.x = clamp_percent(marker.x);
        marker.y = clamp_percent(marker.y);
        self.markers.push(marker);
        RemoteOutcome::Applied
    }

    /// Apply or reconcile a remote field update.
    pub fn handle_remote_marker_updated(
        &mut self,
        id: &MarkerId,
        changes: &MarkerChanges,
        origin: &RemoteOrigin,
    ) -> RemoteOutcome {
        if self.is_echo(origin) {
            return RemoteOutcome::Ignored(IgnoreReason::Echo);
        }
        let Some(index) = self.index_of(id) else {
            return RemoteOutcome::Ignored(IgnoreReason::UnknownMarker);
        };

        let local = self.markers[index].clone();
        if !self.dirty_markers.contains(id) || !changes.differs_from(&local) {
            changes.apply_to(&mut self.markers[index]);
            return RemoteOutcome::Applied;
        }

        let conflict_type = if changes.touches_position(&local) {
            ConflictType::Position
        } else {
            ConflictType::Properties
        };
        // Accumulate on top of the remote side already recorded, if any.
        let remote_base = self
            .open_conflict(id)
            .and_then(|c| c.server_version.clone())
            .unwrap_or_else(|| local.clone());
        let server_version = changes.applied(&remote_base);
        let conflict_type =
            self.record_conflict(local, Some(server_version), conflict_type, origin);
        if conflict_type == ConflictType::Deletion {
            return RemoteOutcome::Conflicted {
                conflict_type,
                remote_applied: false,
            };
        }

        let remote_applied = match self.strategy.auto_resolution() {
            Some(AutoResolution::RemoteApplied) => {
                changes.apply_to(&mut self.markers[index]);
                self.dirty_markers.remove(id);
                true
            }
            Some(AutoResolution::LocalKept) | None => false,
        };
        RemoteOutcome::Conflicted {
            conflict_type,
            remote_applied,
        }
    }

    /// Apply or reconcile a remote delete.
    pub fn handle_remote_marker_deleted(
        &mut self,
        id: &MarkerId,
        origin: &RemoteOrigin,
    ) -> RemoteOutcome {
        if self.is_echo(origin) {
            return RemoteOutcome::Ignored(IgnoreReason::Echo);
        }
        let Some(index) = self.index_of(id) else {
            return RemoteOutcome::Ignored(IgnoreReason::UnknownMarker);
        };

        if !self.dirty_markers.contains(id) {
            self.remove_quietly(index);
            return RemoteOutcome::Applied;
        }

        let local = self.markers[index].clone();
        self.record_conflict(local, None, ConflictType::Deletion, origin);

        let remote_applied = match self.strategy.auto_resolution() {
            Some(AutoResolution::RemoteApplied) => {
                self.remove_quietly(index);
                self.dirty_markers.remove(id);
                true
            }
            Some(AutoResolution::LocalKept) | None => false,
        };
        RemoteOutcome::Conflicted {
            conflict_type: ConflictType::Deletion,
            remote_applied,
        }
    }

    // ===========================================
    // Conflict resolution
    // ===========================================

    /// Resolve the open conflict for a marker.
    ///
    /// Returns the resolved conflict. Resolved conflicts are history and
    /// cannot be resolved again.
    pub fn resolve_conflict(
        &mut self,
        marker_id: &MarkerId,
        resolution: Resolution,
    ) -> Result<MarkerConflict, StoreError> {
        let conflict_index = self
            .conflicts
            .iter()
            .position(|c| c.is_open() && c.marker_id == *marker_id)
            .ok_or_else(|| StoreError::ConflictNotFound(marker_id.clone()))?;
        let conflict = self.conflicts[conflict_index].clone();
        let remote_already_applied = conflict.auto_resolution == Some(AutoResolution::RemoteApplied);

        let effective = match (resolution, conflict.conflict_type) {
            (Resolution::Merge, ConflictType::Position) => Resolution::Merge,
            (Resolution::Merge, _) => Resolution::AcceptRemote,
            (other, _) => other,
        };

        match effective {
            Resolution::KeepLocal => {
                if remote_already_applied {
                    self.put_marker(conflict.local_version.clone());
                }
            }
            Resolution::AcceptRemote => {
                match &conflict.server_version {
                    None => {
                        if let Some(index) = self.index_of(marker_id) {
                            self.remove_quietly(index);
                        }
                    }
                    Some(server) => {
                        if !remote_already_applied {
                            self.upsert(server.clone());
                        }
                    }
                }
                self.dirty_markers.remove(marker_id);
            }
            Resolution::Merge => {
                if let Some(merged) = conflict.merged_version() {
                    self.put_marker(merged);
                }
            }
        }

        let resolved = &mut self.conflicts[conflict_index];
        resolved.resolved = true;
        resolved.resolution = Some(resolution);
        Ok(resolved.clone())
    }

    // ===========================================
    // Persistence support
    // ===========================================

    /// The payload for a save: confirmed markers without pending ones.
    pub fn save_payload(&self) -> Result<Vec<KeyLocation>, StoreError> {
        let pending: HashSet<&MarkerId> = self.optimistic.iter().map(|o| &o.marker.id).collect();
        self.markers
            .iter()
            .filter(|m| !pending.contains(&m.id))
            .map(|m| {
                m.validate()?;
                Ok(m.to_key_location())
            })
            .collect()
    }

    /// Record that the current marker set has been persisted.
    pub fn mark_saved(&mut self) {
        self.unsaved = false;
        self.dirty_markers.clear();
    }

    // ===========================================
    // Internals
    // ===========================================

    fn is_echo(&self, origin: &RemoteOrigin) -> bool {
        origin.session_id == self.session_id
    }

    fn index_of(&self, id: &MarkerId) -> Option<usize> {
        self.markers.iter().position(|m| m.id == *id)
    }

    fn touch(&mut self, id: &MarkerId) {
        self.dirty_markers.insert(id.clone());
        self.unsaved = true;
    }

    fn upsert(&mut self, marker: Marker) {
        match self.index_of(&marker.id) {
            Some(index) => self.markers[index] = marker,
            None => self.markers.push(marker),
        }
    }

    fn remove_quietly(&mut self, index: usize) {
        let removed = self.markers.remove(index);
        if self.selected.as_ref() == Some(&removed.id) {
            self.selected = None;
        }
    }

    fn record_conflict(
        &mut self,
        local_version: Marker,
        server_version: Option<Marker>,
        conflict_type: ConflictType,
        origin: &RemoteOrigin,
    ) -> ConflictType {
        let auto_resolution = self.strategy.auto_resolution();
        let marker_id = local_version.id.clone();

        if let Some(existing) = self
            .conflicts
            .iter_mut()
            .find(|c| c.is_open() && c.marker_id == marker_id)
        {
            existing.local_version = local_version;
            // A pending remote delete supersedes later remote updates.
            if existing.conflict_type == ConflictType::Deletion
                && conflict_type != ConflictType::Deletion
            {
                return ConflictType::Deletion;
            }
            // Position dominates so a later merge can still keep local x/y.
            if !(existing.conflict_type == ConflictType::Position
                && conflict_type == ConflictType::Properties)
            {
                existing.conflict_type = conflict_type;
            }
            existing.server_version = server_version;
            existing.remote_user = origin.user_id.clone();
            existing.auto_resolution = auto_resolution;
            return existing.conflict_type;
        }

        self.conflicts.push(MarkerConflict {
            marker_id,
            floor_plan_id: self.floor_plan_id.clone(),
            local_version,
            server_version,
            conflict_type,
            remote_user: origin.user_id.clone(),
            detected_at: origin.received_at,
            resolved: false,
            resolution: None,
            auto_resolution,
        });
        conflict_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorsync_types::MarkerType;

    fn plan() -> FloorPlanId {
        FloorPlanId::from("plan-1")
    }

    fn store() -> MarkerStore {
        MarkerStore::new(plan(), SessionId::new())
    }

    fn store_with(strategy: ConflictResolutionStrategy) -> MarkerStore {
        store().with_strategy(strategy)
    }

    fn remote() -> RemoteOrigin {
        RemoteOrigin {
            user_id: UserId::from("userX"),
            session_id: SessionId::new(),
            received_at: 1_000,
        }
    }

    fn own(store: &MarkerStore) -> RemoteOrigin {
        RemoteOrigin {
            user_id: UserId::from("me"),
            session_id: store.session_id(),
            received_at: 1_000,
        }
    }

    fn marker(id: &str, x: f64, y: f64) -> Marker {
        Marker::new(id, MarkerType::Hazard, "A", x, y)
    }

    /// A store holding a clean `m1` (as if loaded from the server).
    fn loaded(strategy: ConflictResolutionStrategy, x: f64, y: f64) -> MarkerStore {
        let mut s = store_with(strategy);
        s.load(vec![marker("m1", x, y)]);
        s
    }

    /// A store holding `m1` with a local, unsaved move.
    fn dirty(strategy: ConflictResolutionStrategy, x: f64, y: f64) -> MarkerStore {
        let mut s = loaded(strategy, 1.0, 1.0);
        s.update_marker(&"m1".into(), &MarkerChanges::new().position(x, y));
        assert!(s.is_marker_dirty(&"m1".into()));
        s
    }

    fn id(value: &str) -> MarkerId {
        MarkerId::from(value)
    }

    // ===========================================
    // Local Mutation Tests
    // ===========================================

    #[test]
    fn add_marker_generates_id_and_selects() {
        let mut s = store();
        let new_id = s.add_marker(MarkerDraft::new(MarkerType::Aed, "Reception", 10.0, 10.0));

        assert_eq!(s.markers().len(), 1);
        assert_eq!(s.selected_marker().unwrap().id, new_id);
        assert!(s.is_dirty());
        assert!(s.is_marker_dirty(&new_id));
    }

    #[test]
    fn update_missing_marker_is_noop() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        let before = s.markers().to_vec();

        assert!(s.update_marker(&id("ghost"), &MarkerChanges::new().name("x")).is_none());
        assert_eq!(s.markers(), before.as_slice());
        assert!(!s.is_dirty());
    }

    #[test]
    fn update_returns_previous_snapshot() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        let before = s
            .update_marker(&id("m1"), &MarkerChanges::new().position(10.0, 20.0))
            .unwrap();

        assert_eq!(before.position(), (1.0, 1.0));
        assert_eq!(s.marker(&id("m1")).unwrap().position(), (10.0, 20.0));
        assert!(s.is_dirty());
    }

    #[test]
    fn delete_deselects_and_restore_keeps_order() {
        let mut s = store();
        s.load(vec![marker("a", 1.0, 1.0), marker("b", 2.0, 2.0), marker("c", 3.0, 3.0)]);
        s.select_marker(Some(id("b")));

        let removed = s.delete_marker(&id("b")).unwrap();
        assert!(s.selected_marker().is_none());
        assert_eq!(s.markers().len(), 2);

        s.restore_marker(removed);
        let ids: Vec<&str> = s.markers().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn select_unknown_marker_clears_selection() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        s.select_marker(Some(id("m1")));
        assert!(s.selected_marker().is_some());

        s.select_marker(Some(id("nope")));
        assert!(s.selected_marker().is_none());
    }

    // ===========================================
    // Optimistic Lifecycle Tests
    // ===========================================

    #[test]
    fn optimistic_add_confirms_under_server_id() {
        let mut s = store();
        let spill = Marker::new("provisional", MarkerType::Hazard, "Spill", 50.0, 50.0);
        let token = s.add_optimistic_marker(spill, 10);
        assert!(s.markers().is_empty());
        assert_eq!(s.visible_markers().len(), 1);

        assert_eq!(s.confirm_optimistic_marker(token, id("m1")), Some(id("m1")));

        let matching: Vec<&Marker> = s.markers().iter().filter(|m| m.id == id("m1")).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].name, "Spill");
        assert!(s.optimistic_markers().iter().all(|o| o.client_id != token));
        assert!(s.is_dirty());
    }

    #[test]
    fn confirm_replaces_rendering_copy() {
        let mut s = store();
        let spill = Marker::new("wire-1", MarkerType::Hazard, "Spill", 50.0, 50.0);
        let token = s.add_optimistic_marker(spill.clone(), 10);
        s.put_marker(spill);
        // Dragged while pending.
        s.update_marker(&id("wire-1"), &MarkerChanges::new().position(60.0, 61.0));

        s.confirm_optimistic_marker(token, id("m1"));

        assert_eq!(s.markers().len(), 1);
        assert_eq!(s.markers()[0].id, id("m1"));
        assert_eq!(s.markers()[0].position(), (60.0, 61.0));
        assert!(s.visible_markers().len() == 1);
        assert!(!s.is_marker_dirty(&id("m1")));
    }

    #[test]
    fn confirm_under_same_id_keeps_single_marker() {
        let mut s = store();
        let spill = Marker::new("wire-1", MarkerType::Hazard, "Spill", 50.0, 50.0);
        let token = s.add_optimistic_marker(spill.clone(), 10);
        s.put_marker(spill);

        s.confirm_optimistic_marker(token, id("wire-1"));

        assert_eq!(s.markers().len(), 1);
        assert!(s.optimistic_markers().is_empty());
    }

    #[test]
    fn confirm_unknown_token_is_noop() {
        let mut s = store();
        let token = s.add_optimistic_marker(marker("p", 1.0, 1.0), 0);
        s.rollback_optimistic_marker(token);

        assert_eq!(s.confirm_optimistic_marker(token, id("m1")), None);
        assert!(s.markers().is_empty());
    }

    #[test]
    fn rollback_discards_entry_and_copy() {
        let mut s = store();
        let pending = marker("wire-1", 5.0, 5.0);
        let token = s.add_optimistic_marker(pending.clone(), 0);
        s.put_marker(pending);
        s.select_marker(Some(id("wire-1")));

        let rolled_back = s.rollback_optimistic_marker(token).unwrap();
        assert_eq!(rolled_back.client_id, token);
        assert!(s.markers().is_empty());
        assert!(s.visible_markers().is_empty());
        assert!(s.selected_marker().is_none());
    }

    #[test]
    fn expire_pending_rolls_back_only_old_entries() {
        let mut s = store();
        let old = s.add_optimistic_marker(marker("old", 1.0, 1.0), 1_000);
        let fresh = s.add_optimistic_marker(marker("fresh", 2.0, 2.0), 20_000);

        let expired = s.expire_pending(31_000, 30_000);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].client_id, old);
        assert_eq!(s.optimistic_markers().len(), 1);
        assert_eq!(s.optimistic_markers()[0].client_id, fresh);
    }

    // ===========================================
    // Echo Suppression Tests
    // ===========================================

    #[test]
    fn echo_of_local_add_does_not_duplicate() {
        let mut s = store();
        let spill = Marker::new("m1", MarkerType::Hazard, "Spill", 50.0, 50.0);
        let token = s.add_optimistic_marker(spill.clone(), 0);
        s.put_marker(spill.clone());
        s.confirm_optimistic_marker(token, id("m1"));
        let before = s.markers().to_vec();

        let origin = own(&s);
        let outcome = s.handle_remote_marker_added(spill, &origin);

        assert_eq!(outcome, RemoteOutcome::Ignored(IgnoreReason::Echo));
        assert_eq!(s.markers(), before.as_slice());
    }

    #[test]
    fn echo_of_local_update_creates_no_conflict() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        let origin = own(&s);

        let outcome = s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(99.0, 99.0),
            &origin,
        );

        assert_eq!(outcome, RemoteOutcome::Ignored(IgnoreReason::Echo));
        assert!(s.conflicts().is_empty());
        assert_eq!(s.marker(&id("m1")).unwrap().position(), (10.0, 20.0));
    }

    #[test]
    fn echo_of_local_delete_is_ignored() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        let origin = own(&s);

        let outcome = s.handle_remote_marker_deleted(&id("m1"), &origin);

        assert_eq!(outcome, RemoteOutcome::Ignored(IgnoreReason::Echo));
        assert!(s.marker(&id("m1")).is_some());
        assert!(s.conflicts().is_empty());
    }

    // ===========================================
    // Remote Add Tests
    // ===========================================

    #[test]
    fn remote_add_appends_new_marker() {
        let mut s = store();
        let outcome = s.handle_remote_marker_added(marker("m7", 3.0, 4.0), &remote());

        assert_eq!(outcome, RemoteOutcome::Applied);
        assert_eq!(s.markers().len(), 1);
        assert!(!s.is_dirty());
    }

    #[test]
    fn remote_add_clamps_out_of_range_coordinates() {
        let mut s = store();
        let mut wild = marker("m7", 3.0, 4.0);
        wild.x = 150.0;
        wild.y = f64::NAN;

        s.handle_remote_marker_added(wild, &remote());

        assert_eq!(s.marker(&id("m7")).unwrap().position(), (100.0, 0.0));
        assert!(s.save_payload().is_ok());
    }

    #[test]
    fn remote_add_of_existing_or_pending_id_is_ignored() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        s.add_optimistic_marker(marker("pending", 1.0, 1.0), 0);

        assert_eq!(
            s.handle_remote_marker_added(marker("m1", 9.0, 9.0), &remote()),
            RemoteOutcome::Ignored(IgnoreReason::AlreadyPresent)
        );
        assert_eq!(
            s.handle_remote_marker_added(marker("pending", 9.0, 9.0), &remote()),
            RemoteOutcome::Ignored(IgnoreReason::AlreadyPresent)
        );
        assert_eq!(s.markers().len(), 1);
        assert_eq!(s.marker(&id("m1")).unwrap().position(), (1.0, 1.0));
    }

    // ===========================================
    // Remote Update Tests
    // ===========================================

    #[test]
    fn remote_update_on_clean_marker_applies_without_conflict() {
        for strategy in [
            ConflictResolutionStrategy::ServerAuthoritative,
            ConflictResolutionStrategy::LocalWins,
            ConflictResolutionStrategy::LastWriteWins,
            ConflictResolutionStrategy::Manual,
        ] {
            let mut s = loaded(strategy, 1.0, 1.0);
            let outcome = s.handle_remote_marker_updated(
                &id("m1"),
                &MarkerChanges::new().position(40.0, 41.0).name("Moved"),
                &remote(),
            );

            assert_eq!(outcome, RemoteOutcome::Applied);
            assert!(s.conflicts().is_empty());
            let m = s.marker(&id("m1")).unwrap();
            assert_eq!(m.position(), (40.0, 41.0));
            assert_eq!(m.name, "Moved");
        }
    }

    #[test]
    fn remote_update_for_unknown_marker_is_ignored() {
        let mut s = store();
        let outcome =
            s.handle_remote_marker_updated(&id("ghost"), &MarkerChanges::new().name("x"), &remote());
        assert_eq!(outcome, RemoteOutcome::Ignored(IgnoreReason::UnknownMarker));
        assert!(s.markers().is_empty());
    }

    #[test]
    fn dirty_marker_with_differing_update_conflicts_and_server_wins() {
        let mut s = dirty(ConflictResolutionStrategy::ServerAuthoritative, 10.0, 20.0);

        let outcome = s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(70.0, 80.0),
            &remote(),
        );

        assert_eq!(
            outcome,
            RemoteOutcome::Conflicted {
                conflict_type: ConflictType::Position,
                remote_applied: true,
            }
        );
        let open = s.open_conflicts();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].marker_id, id("m1"));
        assert_eq!(open[0].local_version.position(), (10.0, 20.0));
        assert_eq!(
            open[0].server_version.as_ref().unwrap().position(),
            (70.0, 80.0)
        );
        assert_eq!(s.marker(&id("m1")).unwrap().position(), (70.0, 80.0));
        assert!(!s.is_marker_dirty(&id("m1")));
    }

    #[test]
    fn last_write_wins_applies_remote() {
        let mut s = dirty(ConflictResolutionStrategy::LastWriteWins, 10.0, 20.0);
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("Remote"), &remote());

        assert_eq!(s.marker(&id("m1")).unwrap().name, "Remote");
        assert_eq!(s.open_conflicts().len(), 1);
        assert_eq!(s.open_conflicts()[0].conflict_type, ConflictType::Properties);
    }

    #[test]
    fn local_wins_keeps_local_values() {
        let mut s = dirty(ConflictResolutionStrategy::LocalWins, 10.0, 20.0);

        let outcome = s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(70.0, 80.0),
            &remote(),
        );

        assert_eq!(
            outcome,
            RemoteOutcome::Conflicted {
                conflict_type: ConflictType::Position,
                remote_applied: false,
            }
        );
        assert_eq!(s.marker(&id("m1")).unwrap().position(), (10.0, 20.0));
        assert_eq!(s.open_conflicts()[0].auto_resolution, Some(AutoResolution::LocalKept));
    }

    #[test]
    fn manual_leaves_both_versions_unapplied() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);

        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("B"), &remote());

        let m = s.marker(&id("m1")).unwrap();
        assert_eq!(m.name, "A");
        assert_eq!(m.position(), (10.0, 20.0));
        let conflict = s.open_conflict(&id("m1")).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Properties);
        assert_eq!(conflict.server_version.as_ref().unwrap().name, "B");
        assert_eq!(conflict.auto_resolution, None);
        assert_eq!(conflict.detected_at, 1_000);
    }

    #[test]
    fn repeated_remote_updates_refresh_single_conflict() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);

        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().position(70.0, 80.0), &remote());
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("B"), &remote());

        assert_eq!(s.conflicts().len(), 1);
        let conflict = &s.conflicts()[0];
        assert_eq!(conflict.conflict_type, ConflictType::Position);
        let server = conflict.server_version.as_ref().unwrap();
        assert_eq!(server.position(), (70.0, 80.0));
        assert_eq!(server.name, "B");
    }

    #[test]
    fn remote_update_after_remote_delete_keeps_deletion_conflict() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        let deleter = remote();
        let editor = RemoteOrigin {
            user_id: UserId::from("userY"),
            ..remote()
        };

        s.handle_remote_marker_deleted(&id("m1"), &deleter);
        let outcome =
            s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("Z"), &editor);

        assert_eq!(
            outcome,
            RemoteOutcome::Conflicted {
                conflict_type: ConflictType::Deletion,
                remote_applied: false,
            }
        );
        let conflict = s.open_conflict(&id("m1")).unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::Deletion);
        assert!(conflict.server_version.is_none());
        assert_eq!(conflict.remote_user, UserId::from("userX"));

        s.resolve_conflict(&id("m1"), Resolution::AcceptRemote).unwrap();
        assert!(s.marker(&id("m1")).is_none());
    }

    #[test]
    fn dirty_marker_with_identical_values_does_not_conflict() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);

        let outcome = s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(10.0, 20.0),
            &remote(),
        );

        assert_eq!(outcome, RemoteOutcome::Applied);
        assert!(s.conflicts().is_empty());
    }

    #[test]
    fn saved_marker_is_clean_again() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        s.mark_saved();

        let outcome = s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(70.0, 80.0),
            &remote(),
        );

        assert_eq!(outcome, RemoteOutcome::Applied);
        assert!(!s.is_dirty());
    }

    // ===========================================
    // Remote Delete Tests
    // ===========================================

    #[test]
    fn remote_delete_of_clean_marker_applies() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        s.select_marker(Some(id("m1")));

        assert_eq!(s.handle_remote_marker_deleted(&id("m1"), &remote()), RemoteOutcome::Applied);
        assert!(s.markers().is_empty());
        assert!(s.selected_marker().is_none());
        assert!(s.conflicts().is_empty());
    }

    #[test]
    fn remote_delete_of_unknown_marker_is_ignored() {
        let mut s = store();
        assert_eq!(
            s.handle_remote_marker_deleted(&id("m1"), &remote()),
            RemoteOutcome::Ignored(IgnoreReason::UnknownMarker)
        );
    }

    #[test]
    fn manual_deletion_conflict_keeps_marker() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 60.0, 60.0);

        let outcome = s.handle_remote_marker_deleted(&id("m1"), &remote());

        assert_eq!(
            outcome,
            RemoteOutcome::Conflicted {
                conflict_type: ConflictType::Deletion,
                remote_applied: false,
            }
        );
        assert!(s.marker(&id("m1")).is_some());
        let open = s.open_conflicts();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].conflict_type, ConflictType::Deletion);
        assert!(open[0].server_version.is_none());
    }

    #[test]
    fn server_authoritative_deletion_applies_and_records() {
        let mut s = dirty(ConflictResolutionStrategy::ServerAuthoritative, 60.0, 60.0);

        s.handle_remote_marker_deleted(&id("m1"), &remote());

        assert!(s.marker(&id("m1")).is_none());
        assert_eq!(s.open_conflicts().len(), 1);
    }

    // ===========================================
    // Conflict Resolution Tests
    // ===========================================

    #[test]
    fn keep_local_marks_resolved_without_state_change() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().position(70.0, 80.0), &remote());
        let before = s.markers().to_vec();

        let resolved = s.resolve_conflict(&id("m1"), Resolution::KeepLocal).unwrap();

        assert!(resolved.resolved);
        assert_eq!(resolved.resolution, Some(Resolution::KeepLocal));
        assert_eq!(s.markers(), before.as_slice());
        assert!(s.open_conflicts().is_empty());
        assert_eq!(s.conflicts().len(), 1);
    }

    #[test]
    fn keep_local_after_server_applied_reinstates_local() {
        let mut s = dirty(ConflictResolutionStrategy::ServerAuthoritative, 10.0, 20.0);
        s.handle_remote_marker_deleted(&id("m1"), &remote());
        assert!(s.marker(&id("m1")).is_none());

        s.resolve_conflict(&id("m1"), Resolution::KeepLocal).unwrap();

        assert_eq!(s.marker(&id("m1")).unwrap().position(), (10.0, 20.0));
        assert!(s.is_marker_dirty(&id("m1")));
    }

    #[test]
    fn accept_remote_applies_server_version() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().position(70.0, 80.0), &remote());

        s.resolve_conflict(&id("m1"), Resolution::AcceptRemote).unwrap();

        assert_eq!(s.marker(&id("m1")).unwrap().position(), (70.0, 80.0));
        assert!(!s.is_marker_dirty(&id("m1")));
    }

    #[test]
    fn accept_remote_performs_delete() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 60.0, 60.0);
        s.handle_remote_marker_deleted(&id("m1"), &remote());

        s.resolve_conflict(&id("m1"), Resolution::AcceptRemote).unwrap();

        assert!(s.marker(&id("m1")).is_none());
    }

    #[test]
    fn merge_keeps_local_position_and_remote_properties() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 5.0, 5.0);
        s.handle_remote_marker_updated(
            &id("m1"),
            &MarkerChanges::new().position(9.0, 9.0).name("B"),
            &remote(),
        );

        s.resolve_conflict(&id("m1"), Resolution::Merge).unwrap();

        let m = s.marker(&id("m1")).unwrap();
        assert_eq!(m.position(), (5.0, 5.0));
        assert_eq!(m.name, "B");
    }

    #[test]
    fn merge_on_property_conflict_degrades_to_accept_remote() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        s.update_marker(&id("m1"), &MarkerChanges::new().name("Local"));
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("Remote"), &remote());

        let resolved = s.resolve_conflict(&id("m1"), Resolution::Merge).unwrap();

        assert_eq!(s.marker(&id("m1")).unwrap().name, "Remote");
        assert_eq!(resolved.resolution, Some(Resolution::Merge));
    }

    #[test]
    fn resolved_conflicts_cannot_be_reopened() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("B"), &remote());
        s.resolve_conflict(&id("m1"), Resolution::KeepLocal).unwrap();

        let again = s.resolve_conflict(&id("m1"), Resolution::AcceptRemote);
        assert!(matches!(again, Err(StoreError::ConflictNotFound(_))));
        assert_eq!(s.conflicts()[0].resolution, Some(Resolution::KeepLocal));
    }

    #[test]
    fn new_conflict_after_resolution_is_separate_history() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("B"), &remote());
        s.resolve_conflict(&id("m1"), Resolution::KeepLocal).unwrap();

        s.handle_remote_marker_updated(&id("m1"), &MarkerChanges::new().name("C"), &remote());

        assert_eq!(s.conflicts().len(), 2);
        assert_eq!(s.open_conflicts().len(), 1);
    }

    // ===========================================
    // Persistence Support Tests
    // ===========================================

    #[test]
    fn save_payload_excludes_pending_markers() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        let pending = marker("wire-1", 2.0, 2.0);
        s.add_optimistic_marker(pending.clone(), 0);
        s.put_marker(pending);

        let payload = s.save_payload().unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload[0].x, 1.0);
    }

    #[test]
    fn save_payload_rejects_unnamed_marker() {
        let mut s = loaded(ConflictResolutionStrategy::Manual, 1.0, 1.0);
        s.update_marker(&id("m1"), &MarkerChanges::new().name(""));

        assert!(matches!(s.save_payload(), Err(StoreError::InvalidMarker(_))));
    }

    #[test]
    fn mark_saved_clears_dirty_state() {
        let mut s = dirty(ConflictResolutionStrategy::Manual, 10.0, 20.0);
        assert!(s.is_dirty());

        s.mark_saved();

        assert!(!s.is_dirty());
        assert!(!s.is_marker_dirty(&id("m1")));
    }

    #[test]
    fn load_keeps_one_marker_per_id() {
        let mut s = store();
        s.load(vec![marker("m1", 1.0, 1.0), marker("m1", 2.0, 2.0)]);

        assert_eq!(s.markers().len(), 1);
        assert_eq!(s.markers()[0].position(), (2.0, 2.0));
    }
}
