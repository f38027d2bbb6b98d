//! Presence tracking for one floor plan.
//!
//! Tracks which users are viewing the floor plan and whether they are
//! editing. Pure state: the heartbeat task in `floorsync-client` drives it
//! with timestamps and ships the messages it returns.

use std::collections::HashMap;

use floorsync_types::{FloorPlanId, PresenceHeartbeat, PresenceLeave, PresenceUser, UserId};

/// A user currently on the floor plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    /// Account identifier
    pub user_id: UserId,
    /// Display name
    pub user_name: String,
    /// Optional role label
    pub user_role: Option<String>,
    /// Whether the user is editing markers
    pub is_editing: bool,
    /// Last heartbeat seen (ms)
    pub last_seen: u64,
}

impl PresenceEntry {
    fn from_user(user: &PresenceUser, is_editing: bool, last_seen: u64) -> Self {
        Self {
            user_id: user.user_id.clone(),
            user_name: user.user_name.clone(),
            user_role: user.user_role.clone(),
            is_editing,
            last_seen,
        }
    }

    /// Whether the entry has gone without a heartbeat for `stale_after_ms`.
    pub fn is_stale(&self, now: u64, stale_after_ms: u64) -> bool {
        now.saturating_sub(self.last_seen) > stale_after_ms
    }
}

/// Presence state for the local user and their peers.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local: PresenceUser,
    floor_plan_id: FloorPlanId,
    is_editing: bool,
    joined: bool,
    peers: HashMap<UserId, PresenceEntry>,
    stale_after_ms: u64,
}

impl PresenceTracker {
    /// Create a tracker for `local` on a floor plan.
    pub fn new(local: PresenceUser, floor_plan_id: FloorPlanId, stale_after_ms: u64) -> Self {
        Self {
            local,
            floor_plan_id,
            is_editing: false,
            joined: false,
            peers: HashMap::new(),
            stale_after_ms,
        }
    }

    /// The floor plan being tracked.
    pub fn floor_plan_id(&self) -> &FloorPlanId {
        &self.floor_plan_id
    }

    /// The local user.
    pub fn local_user(&self) -> &PresenceUser {
        &self.local
    }

    /// Whether [`join`](Self::join) has been called without a matching leave.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Register the local user and produce the first heartbeat.
    pub fn join(&mut self, now: u64) -> PresenceHeartbeat {
        self.joined = true;
        self.heartbeat(now)
    }

    /// Forget every peer and produce the leave message.
    ///
    /// Returns `None` if the tracker never joined.
    pub fn leave(&mut self) -> Option<PresenceLeave> {
        if !self.joined {
            return None;
        }
        self.joined = false;
        self.is_editing = false;
        self.peers.clear();
        Some(PresenceLeave {
            floor_plan_id: self.floor_plan_id.clone(),
            user_id: self.local.user_id.clone(),
        })
    }

    /// Set the local editing flag.
    pub fn set_editing_mode(&mut self, is_editing: bool) {
        self.is_editing = is_editing;
    }

    /// The local editing flag.
    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    /// Refresh the local entry and produce a heartbeat to broadcast.
    pub fn heartbeat(&mut self, now: u64) -> PresenceHeartbeat {
        let entry = PresenceEntry::from_user(&self.local, self.is_editing, now);
        self.peers.insert(entry.user_id.clone(), entry);
        PresenceHeartbeat {
            floor_plan_id: self.floor_plan_id.clone(),
            user: self.local.clone(),
            is_editing: self.is_editing,
        }
    }

    /// Upsert the sender's entry. Heartbeats for other floor plans and
    /// our own echoes are ignored.
    pub fn handle_heartbeat(&mut self, heartbeat: &PresenceHeartbeat, now: u64) -> bool {
        if heartbeat.floor_plan_id != self.floor_plan_id
            || heartbeat.user.user_id == self.local.user_id
        {
            return false;
        }
        let entry = PresenceEntry::from_user(&heartbeat.user, heartbeat.is_editing, now);
        self.peers.insert(entry.user_id.clone(), entry);
        true
    }

    /// Remove a peer that left.
    pub fn handle_leave(&mut self, leave: &PresenceLeave) -> bool {
        if leave.floor_plan_id != self.floor_plan_id || leave.user_id == self.local.user_id {
            return false;
        }
        self.peers.remove(&leave.user_id).is_some()
    }

    /// Drop peers whose heartbeat is older than the staleness window.
    ///
    /// The local entry is never pruned.
    pub fn prune_stale(&mut self, now: u64) -> Vec<UserId> {
        let stale: Vec<UserId> = self
            .peers
            .values()
            .filter(|e| e.user_id != self.local.user_id && e.is_stale(now, self.stale_after_ms))
            .map(|e| e.user_id.clone())
            .collect();

        for user_id in &stale {
            self.peers.remove(user_id);
        }
        stale
    }

    /// Everyone on the floor plan, including self, sorted by name.
    pub fn active_users(&self) -> Vec<PresenceEntry> {
        let mut users: Vec<PresenceEntry> = self.peers.values().cloned().collect();
        users.sort_by(|a, b| {
            a.user_name
                .cmp(&b.user_name)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    /// Number of users present, including self.
    pub fn user_count(&self) -> usize {
        self.peers.len()
    }
}
