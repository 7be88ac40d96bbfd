use crate::discovery::handle_discover;
use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::router::{ConnHandle, Registration};
use crate::server::ServerState;
use amp_common::frame::{self, FrameError};
use amp_common::packet::Packet;
use amp_common::types::{reply_body, DISCOVER_PREFIX, SERVER_IDENTITY};
use prost::Message;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    let (mut reader, writer) = stream.into_split();
    let conn = Arc::new(ConnHandle::new(state.next_conn_id(), peer, writer));

    info!(peer = %peer, "connection accepted");
    gauges::inc_connections_active();

    let result = read_loop(&mut reader, &conn, &state).await;

    if let Some(identity) = state.router.unregister(&conn) {
        info!(peer = %peer, identity = %identity, "unregistered");
    }
    gauges::dec_connections_active();
    result
}

/// Reads frames until the peer hangs up, the transport fails, or the
/// connection is closed from elsewhere (identity takeover, heartbeat
/// eviction). Malformed packets are dropped without closing; framing
/// violations are fatal.
async fn read_loop(
    reader: &mut OwnedReadHalf,
    conn: &Arc<ConnHandle>,
    state: &Arc<ServerState>,
) -> Result<(), RelayError> {
    loop {
        let payload = tokio::select! {
            result = frame::read_frame(reader) => match result {
                Ok(payload) => payload,
                Err(FrameError::Eof) => return Ok(()),
                Err(e) => {
                    warn!(peer = %conn.peer(), error = %e, "closing connection");
                    return Err(e.into());
                }
            },
            () = conn.closed() => return Ok(()),
        };

        let packet = match Packet::decode(payload.as_slice()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(peer = %conn.peer(), error = %e, "dropped undecodable packet");
                counters::packets_dropped_total("decode");
                continue;
            }
        };

        let start = Instant::now();
        process_packet(packet, conn, state).await?;
        histograms::dispatch_latency_seconds(start.elapsed().as_secs_f64());
    }
}

/// Verifies, registers, counts, and dispatches one decoded packet.
///
/// An `Err` means a reply write to this connection failed and the handler
/// must exit; every other failure is absorbed here.
async fn process_packet(
    packet: Packet,
    conn: &Arc<ConnHandle>,
    state: &Arc<ServerState>,
) -> Result<(), RelayError> {
    if packet.sig.is_empty() && packet.pk.is_empty() {
        warn!(
            peer = %conn.peer(),
            src = %packet.src,
            body = %packet.body,
            "DROPPED unsigned packet"
        );
        counters::packets_dropped_total("unsigned");
        return Ok(());
    }

    if let Err(e) = amp_common::crypto::verify_packet(&packet) {
        warn!(peer = %conn.peer(), src = %packet.src, error = %e, "DROPPED invalid sig");
        counters::packets_dropped_total("bad_sig");
        return Ok(());
    }

    if !packet.src.is_empty() {
        match state.router.register(&packet.src, conn) {
            Registration::Unchanged => {}
            Registration::Installed => {
                info!(identity = %packet.src, peer = %conn.peer(), "registered");
            }
            Registration::Displaced(old) => {
                info!(
                    identity = %packet.src,
                    old_peer = %old.peer(),
                    "identity re-registered, closing old connection"
                );
                old.close();
            }
        }
    }

    state.total_packets.fetch_add(1, Ordering::Relaxed);
    counters::packets_total();

    if !packet.scar.is_empty() {
        info!(
            src = %packet.src,
            dst = %packet.dst,
            bytes = packet.scar.len(),
            "scar exchange"
        );
        state.scar.record(&packet.src);
    }

    debug!(
        src = %packet.src,
        typ = packet.typ,
        body = %packet.body,
        dst = %packet.dst,
        "packet"
    );

    if let Some(suffix) = packet.dst.strip_prefix(DISCOVER_PREFIX) {
        handle_discover(state, conn, &packet, suffix).await
    } else if packet.dst.is_empty() || packet.dst == SERVER_IDENTITY {
        reply(conn, &packet, reply_body::DONE).await
    } else {
        forward(state, conn, packet).await
    }
}

/// Delivers the original signed packet to the destination's connection.
/// The relay never re-signs: the receiver validates the frame against the
/// sender's own key.
async fn forward(
    state: &Arc<ServerState>,
    conn: &Arc<ConnHandle>,
    packet: Packet,
) -> Result<(), RelayError> {
    let Some(target) = state.router.lookup(&packet.dst) else {
        debug!(src = %packet.src, dst = %packet.dst, "route offline");
        counters::forwards_total("offline");
        return reply(conn, &packet, reply_body::OFFLINE).await;
    };

    match target.send_packet(&packet).await {
        Ok(()) => {
            debug!(src = %packet.src, dst = %packet.dst, "routed");
            counters::forwards_total("delivered");
            Ok(())
        }
        Err(e) => {
            warn!(src = %packet.src, dst = %packet.dst, error = %e, "delivery failed");
            counters::forwards_total("delivery_failed");
            reply(conn, &packet, reply_body::DELIVERY_FAILED).await
        }
    }
}

/// Writes a relay reply echoing the inbound packet's `id`. A failed reply
/// write is fatal to this connection.
pub(crate) async fn reply(
    conn: &Arc<ConnHandle>,
    packet: &Packet,
    body: impl Into<String>,
) -> Result<(), RelayError> {
    let response = Packet::reply(&packet.id, body);
    conn.send_packet(&response).await?;
    Ok(())
}
