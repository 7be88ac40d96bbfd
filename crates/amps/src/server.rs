use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::RelayError;
use crate::router::Router;
use amp_common::types::Identity;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Version string reported by `discover:info` and logged at startup.
pub const SERVER_VERSION: &str = "0.3.0";

/// Upper bound on distinct identities tracked by the scar ledger. Once the
/// ledger is full, unknown identities are no longer added but known ones
/// keep counting.
pub const MAX_SCAR_ENTRIES: usize = 1000;

/// Per-identity count of scar-bearing packets, reported by `discover:stats`.
#[derive(Debug, Default)]
pub struct ScarLedger {
    counts: Mutex<HashMap<Identity, u64>>,
}

impl ScarLedger {
    /// Counts one scar-bearing packet from `identity`, subject to the
    /// [`MAX_SCAR_ENTRIES`] bound.
    pub fn record(&self, identity: &str) {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(identity) {
            *count += 1;
        } else if counts.len() < MAX_SCAR_ENTRIES {
            counts.insert(identity.to_owned(), 1);
        }
    }

    /// Returns a copy of the current counts.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Identity, u64> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Shared state for the relay server, threaded into every handler.
#[derive(Debug)]
pub struct ServerState {
    /// Identity routing table for dispatching forwards between agents.
    pub router: Router,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Instant the server started, for `discover:info` uptime.
    pub started_at: Instant,
    /// Count of admissible packets handled since startup.
    pub total_packets: AtomicU64,
    /// Per-identity scar exchange counts.
    pub scar: ScarLedger,
    next_conn_id: AtomicU64,
}

impl ServerState {
    /// Creates fresh state for one server instance.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            router: Router::new(),
            config,
            started_at: Instant::now(),
            total_packets: AtomicU64::new(0),
            scar: ScarLedger::default(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Runs the accept loop: one spawned handler per connection; accept
/// failures are logged and the loop continues.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, version = SERVER_VERSION, "relay listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, state).await {
                        debug!(peer = %peer, error = %e, "connection closed");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
