//! Scripted two-operator session.
//!
//! Both operators join the same floor plan on an in-process hub. The peer
//! moves a marker, the local operator moves it again before the peer has
//! saved, and the resulting conflict is handled by the peer's policy (or
//! resolved by hand under `manual`).

use anyhow::{bail, Context, Result};
use floorsync_client::{
    FloorPlanSession, HubTransport, LocalHub, MockPersistence, SessionConfig, SessionSnapshot,
};
use floorsync_core::{ConflictResolutionStrategy, MarkerConflict, Resolution};
use floorsync_types::{FloorPlanId, MarkerChanges, MarkerDraft, MarkerType, PresenceUser};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CliConfig;

type Session = FloorPlanSession<HubTransport, MockPersistence>;

const FLOOR_PLAN: &str = "demo-floor-1";
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Run the simulate command.
pub async fn run(config: &CliConfig, peer_strategy: Option<ConflictResolutionStrategy>) -> Result<()> {
    let hub = LocalHub::new();
    let persistence = Arc::new(MockPersistence::new());
    let floor_plan_id = FloorPlanId::from(FLOOR_PLAN);

    let peer_strategy = peer_strategy.unwrap_or(config.session.strategy);
    let local = open(
        &hub,
        &persistence,
        config.user.presence_user(),
        config.session.clone(),
    )
    .await?;
    let peer = open(
        &hub,
        &persistence,
        PresenceUser::new("peer", "Remote operator"),
        config.session.clone().with_strategy(peer_strategy),
    )
    .await?;

    println!("=== floorsync simulate ===");
    println!();
    println!("Floor plan: {}", floor_plan_id);
    println!("Local policy: {}", config.session.strategy.name());
    println!("Peer policy:  {}", peer_strategy.name());
    println!();

    // Re-announce the local operator now that the peer is listening.
    local.set_editing(true).await?;
    wait_for(&peer, "presence", |s| s.active_users.len() == 2).await?;

    let extinguisher = local
        .add_marker(MarkerDraft::new(
            MarkerType::FireExtinguisher,
            "Extinguisher B2",
            40.0,
            40.0,
        ))
        .await?;
    local
        .add_marker(
            MarkerDraft::new(MarkerType::EmergencyExit, "North exit", 50.0, 2.0)
                .with_description("Leads to assembly point A"),
        )
        .await?;
    wait_for(&peer, "markers", |s| s.markers.len() == 2).await?;
    println!("[local] added 2 markers");

    peer.update_marker(&extinguisher, MarkerChanges::new().position(10.0, 20.0))
        .await?;
    wait_for(&local, "peer move", |s| {
        s.markers
            .iter()
            .any(|m| m.id == extinguisher && m.position() == (10.0, 20.0))
    })
    .await?;
    println!("[peer]  moved {} to (10.0, 20.0)", extinguisher);

    local
        .update_marker(&extinguisher, MarkerChanges::new().position(70.0, 80.0))
        .await?;
    println!("[local] moved {} to (70.0, 80.0)", extinguisher);
    wait_for(&peer, "conflict", |s| {
        s.conflicts.iter().any(|c| c.marker_id == extinguisher)
    })
    .await?;

    if peer_strategy == ConflictResolutionStrategy::Manual {
        let resolved = peer.resolve_conflict(&extinguisher, Resolution::Merge).await?;
        println!(
            "[peer]  resolved {:?} conflict with merge",
            resolved.conflict_type
        );
    }

    // Let the last broadcasts land before reporting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    local.save().await.context("Saving the floor plan failed")?;
    let saved = persistence.saved(&floor_plan_id).unwrap_or_default();
    println!("[local] saved {} key locations", saved.len());
    println!();

    report("Local operator", &local).await;
    report("Peer operator", &peer).await;

    local.leave().await?;
    peer.leave().await?;
    Ok(())
}

async fn open(
    hub: &LocalHub,
    persistence: &Arc<MockPersistence>,
    user: PresenceUser,
    config: SessionConfig,
) -> Result<Session> {
    let name = user.user_name.clone();
    let session = FloorPlanSession::new(
        Arc::new(hub.transport()),
        Arc::clone(persistence),
        user,
        FloorPlanId::from(FLOOR_PLAN),
        config,
    );
    session
        .connect("local")
        .await
        .with_context(|| format!("{name} could not connect"))?;
    session
        .join()
        .await
        .with_context(|| format!("{name} could not join {FLOOR_PLAN}"))?;
    Ok(session)
}

/// Poll a session until `ready` holds for its snapshot.
async fn wait_for(
    session: &Session,
    what: &str,
    ready: impl Fn(&SessionSnapshot) -> bool,
) -> Result<SessionSnapshot> {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let snapshot = session.snapshot().await;
        if ready(&snapshot) {
            return Ok(snapshot);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("Timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn report(title: &str, session: &Session) {
    let snapshot = session.snapshot().await;
    let history: Vec<MarkerConflict> = session.read_store(|s| s.conflicts().to_vec()).await;

    println!("{}:", title);
    println!(
        "  Status:  {}{}",
        if snapshot.is_connected { "connected" } else { "offline" },
        if snapshot.is_dirty { ", unsaved changes" } else { "" }
    );

    println!("  Users:   {}", snapshot.active_users.len());
    for user in &snapshot.active_users {
        println!(
            "    - {}{}",
            user.user_name,
            if user.is_editing { " (editing)" } else { "" }
        );
    }

    println!("  Markers: {}", snapshot.markers.len());
    for marker in &snapshot.markers {
        println!(
            "    - {:<16} {:<18} ({:>5.1}, {:>5.1})",
            marker.marker_type.label(),
            marker.name,
            marker.x,
            marker.y
        );
    }

    println!("  Conflicts: {}", history.len());
    for conflict in &history {
        let outcome = match (conflict.resolution, conflict.auto_resolution) {
            (Some(resolution), _) => format!("resolved: {resolution:?}"),
            (None, Some(auto)) => format!("policy: {auto:?}"),
            (None, None) => "open".to_string(),
        };
        println!(
            "    - {:?} on {} with {} ({})",
            conflict.conflict_type, conflict.marker_id, conflict.remote_user, outcome
        );
    }

    if let Some(error) = &snapshot.error {
        println!("  Error:   {}", error);
    }
    println!();
}
