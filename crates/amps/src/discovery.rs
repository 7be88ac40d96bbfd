//! Replies to `discover:*` queries with JSON descriptions of server state.

use crate::connection::reply;
use crate::error::RelayError;
use crate::metrics::counters;
use crate::router::ConnHandle;
use crate::server::{ServerState, SERVER_VERSION};
use amp_common::packet::Packet;
use amp_common::types::{reply_body, Identity};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize)]
struct InfoBody {
    version: &'static str,
    agents_online: usize,
    uptime_sec: u64,
}

#[derive(Serialize)]
struct AgentsBody {
    agents: Vec<Identity>,
}

#[derive(Serialize)]
struct StatsBody {
    scar_exchanges: HashMap<Identity, u64>,
    total_packets: u64,
}

/// Answers one discovery query. Snapshots of the routing table and scar
/// ledger are taken under their own locks; no I/O happens while held.
pub(crate) async fn handle_discover(
    state: &Arc<ServerState>,
    conn: &Arc<ConnHandle>,
    packet: &Packet,
    suffix: &str,
) -> Result<(), RelayError> {
    let body = match suffix {
        "info" => {
            counters::discovery_total("info");
            serde_json::to_string(&InfoBody {
                version: SERVER_VERSION,
                agents_online: state.router.len(),
                uptime_sec: state.started_at.elapsed().as_secs(),
            })?
        }
        "agents" => {
            counters::discovery_total("agents");
            serde_json::to_string(&AgentsBody {
                agents: state.router.identities(),
            })?
        }
        "stats" => {
            counters::discovery_total("stats");
            serde_json::to_string(&StatsBody {
                scar_exchanges: state.scar.snapshot(),
                total_packets: state.total_packets.load(Ordering::Relaxed),
            })?
        }
        _ => {
            counters::discovery_total("unknown");
            reply_body::UNKNOWN_DISCOVERY.to_owned()
        }
    };

    debug!(src = %packet.src, suffix = %suffix, body = %body, "discovery reply");
    reply(conn, packet, body).await
}
