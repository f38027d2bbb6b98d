//! Periodic presence task.
//!
//! Each tick announces the local user, prunes peers that stopped
//! heartbeating and rolls back optimistic adds that were never confirmed.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::persistence::MarkerPersistence;
use crate::session::SessionInner;
use crate::transport::Transport;

/// Spawn the heartbeat loop for the floor plan loaded under `epoch`.
///
/// The loop ends when the session is dropped or switches floor plans.
pub(crate) fn spawn_heartbeat_task<T, P>(
    session: Weak<SessionInner<T, P>>,
    period: Duration,
    epoch: u64,
) -> JoinHandle<()>
where
    T: Transport + 'static,
    P: MarkerPersistence + 'static,
{
    tokio::spawn(async move {
        tracing::debug!("Heartbeat task started (interval: {}s)", period.as_secs());

        // The join itself sends the first heartbeat.
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            if !session.heartbeat_tick(epoch).await {
                break;
            }
        }

        tracing::debug!("Heartbeat task stopped");
    })
}
