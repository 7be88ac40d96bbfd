//! Periodic liveness probing.
//!
//! One long-lived task writes a heartbeat packet to every registered
//! connection each interval. The routing table is snapshotted under the
//! read lock and released before any write, so a slow peer can stall only
//! its own probe; peers whose write fails are evicted and closed.

use crate::metrics::counters;
use crate::server::ServerState;
use amp_common::packet::Packet;
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::warn;

/// Spawns the heartbeat ticker for `state`.
pub fn spawn(state: Arc<ServerState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.heartbeat_interval);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            tick(&state).await;
        }
    })
}

/// Runs one heartbeat pass over every registered connection.
pub(crate) async fn tick(state: &ServerState) {
    let frame = Packet::heartbeat().encode_to_vec();
    for (identity, conn) in state.router.snapshot() {
        if let Err(e) = conn.send_frame(&frame).await {
            warn!(
                identity = %identity,
                peer = %conn.peer(),
                error = %e,
                "heartbeat failed, evicting"
            );
            counters::heartbeat_evictions_total();
            state.router.unregister(&conn);
            conn.close();
        }
    }
}
