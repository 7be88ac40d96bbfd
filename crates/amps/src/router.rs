//! Identity → connection routing with last-writer-wins registration.
//!
//! Two maps form a bijection between live identities and live connections.
//! Both are mutated together under one lock; the lock is never held across
//! I/O, so callers receive evicted handles back and close them after the
//! critical section.

use amp_common::frame::{self, FrameError};
use amp_common::packet::Packet;
use amp_common::types::Identity;
use prost::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify};

/// Handle to a live connection, shared between its owning handler, the
/// routing table, forwarding peers, and the heartbeat ticker.
///
/// All frame emission goes through the internal write mutex so a framed
/// packet reaches the socket as one unit even when several tasks write to
/// the same connection.
#[derive(Debug)]
pub struct ConnHandle {
    id: u64,
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    closed: Notify,
}

impl ConnHandle {
    /// Wraps the write half of an accepted connection.
    #[must_use]
    pub fn new(id: u64, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            peer,
            writer: Mutex::new(writer),
            closed: Notify::new(),
        }
    }

    /// Process-unique connection identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address of the connection.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes one framed payload, serialized against all other writers on
    /// this connection.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] on oversize payloads or transport failure.
    pub async fn send_frame(&self, payload: &[u8]) -> Result<(), FrameError> {
        let mut writer = self.writer.lock().await;
        frame::write_frame(&mut *writer, payload).await
    }

    /// Encodes `packet` and writes it as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] on oversize payloads or transport failure.
    pub async fn send_packet(&self, packet: &Packet) -> Result<(), FrameError> {
        self.send_frame(&packet.encode_to_vec()).await
    }

    /// Asks the owning handler to shut the connection down. The handler's
    /// read loop observes this and exits, which closes the socket.
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }
}

/// Outcome of a [`Router::register`] call.
#[derive(Debug)]
pub enum Registration {
    /// The identity was already bound to this connection.
    Unchanged,
    /// A fresh binding was installed.
    Installed,
    /// The binding displaced another live connection; the caller must
    /// close the returned handle after releasing any locks.
    Displaced(Arc<ConnHandle>),
}

#[derive(Debug, Default)]
struct RouterInner {
    by_identity: HashMap<Identity, Arc<ConnHandle>>,
    by_conn: HashMap<u64, Identity>,
}

/// Bidirectional identity ⇄ connection table.
#[derive(Debug, Default)]
pub struct Router {
    inner: RwLock<RouterInner>,
}

impl Router {
    /// Creates an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RouterInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RouterInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `identity` to `conn`, last writer wins.
    ///
    /// Re-registering the same connection under the same identity leaves
    /// the table unchanged. A connection that re-registers under a new
    /// identity loses its old binding first, so no connection ever appears
    /// under two identities. When the identity was bound to a different
    /// live connection, that connection's mappings are removed and its
    /// handle returned in [`Registration::Displaced`] for the caller to
    /// close outside this table's lock.
    pub fn register(&self, identity: &str, conn: &Arc<ConnHandle>) -> Registration {
        let mut inner = self.write();

        if let Some(existing) = inner.by_identity.get(identity) {
            if existing.id() == conn.id() {
                return Registration::Unchanged;
            }
        }

        if let Some(previous) = inner.by_conn.remove(&conn.id()) {
            inner.by_identity.remove(&previous);
        }

        let evicted = inner
            .by_identity
            .insert(identity.to_owned(), Arc::clone(conn));
        if let Some(old) = &evicted {
            inner.by_conn.remove(&old.id());
        }
        inner.by_conn.insert(conn.id(), identity.to_owned());

        match evicted {
            Some(old) => Registration::Displaced(old),
            None => Registration::Installed,
        }
    }

    /// Removes both mappings for `conn`, returning the identity it was
    /// bound to. Idempotent.
    pub fn unregister(&self, conn: &ConnHandle) -> Option<Identity> {
        let mut inner = self.write();
        let identity = inner.by_conn.remove(&conn.id())?;
        inner.by_identity.remove(&identity);
        Some(identity)
    }

    /// Looks up the connection bound to `identity`.
    #[must_use]
    pub fn lookup(&self, identity: &str) -> Option<Arc<ConnHandle>> {
        self.read().by_identity.get(identity).map(Arc::clone)
    }

    /// Returns all registered identities, in no particular order.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.read().by_identity.keys().cloned().collect()
    }

    /// Returns every `(identity, connection)` pair, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Identity, Arc<ConnHandle>)> {
        self.read()
            .by_identity
            .iter()
            .map(|(identity, conn)| (identity.clone(), Arc::clone(conn)))
            .collect()
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().by_identity.len()
    }

    /// Returns `true` if no identity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().by_identity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    struct TestConn {
        handle: Arc<ConnHandle>,
        _local: tokio::net::tcp::OwnedReadHalf,
        _remote: TcpStream,
    }

    async fn make_conn(id: u64) -> TestConn {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let remote = TcpStream::connect(addr).await.unwrap();
        let (local, peer) = listener.accept().await.unwrap();
        let (read_half, write_half) = local.into_split();
        TestConn {
            handle: Arc::new(ConnHandle::new(id, peer, write_half)),
            _local: read_half,
            _remote: remote,
        }
    }

    fn assert_bijection(router: &Router) {
        let inner = router.read();
        assert_eq!(inner.by_identity.len(), inner.by_conn.len());
        for (identity, conn) in &inner.by_identity {
            assert_eq!(inner.by_conn.get(&conn.id()), Some(identity));
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let router = Router::new();
        let conn = make_conn(1).await;

        assert!(matches!(
            router.register("bot:a", &conn.handle),
            Registration::Installed
        ));
        let found = router.lookup("bot:a").unwrap();
        assert_eq!(found.id(), 1);
        assert_eq!(router.len(), 1);
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn lookup_missing_identity_is_none() {
        let router = Router::new();
        assert!(router.lookup("bot:nobody").is_none());
    }

    #[tokio::test]
    async fn same_binding_twice_is_unchanged() {
        let router = Router::new();
        let conn = make_conn(1).await;

        assert!(matches!(
            router.register("bot:a", &conn.handle),
            Registration::Installed
        ));
        assert!(matches!(
            router.register("bot:a", &conn.handle),
            Registration::Unchanged
        ));
        assert_eq!(router.len(), 1);
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn last_writer_wins_returns_displaced_handle() {
        let router = Router::new();
        let old = make_conn(1).await;
        let new = make_conn(2).await;

        let _ = router.register("bot:a", &old.handle);
        let Registration::Displaced(evicted) = router.register("bot:a", &new.handle) else {
            panic!("expected Displaced");
        };
        assert_eq!(evicted.id(), 1);

        assert_eq!(router.lookup("bot:a").unwrap().id(), 2);
        assert_eq!(router.len(), 1);
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn reregistering_new_identity_drops_old_binding() {
        let router = Router::new();
        let conn = make_conn(1).await;

        assert!(matches!(
            router.register("bot:a", &conn.handle),
            Registration::Installed
        ));
        assert!(matches!(
            router.register("bot:b", &conn.handle),
            Registration::Installed
        ));

        assert!(router.lookup("bot:a").is_none());
        assert_eq!(router.lookup("bot:b").unwrap().id(), 1);
        assert_eq!(router.len(), 1);
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn unregister_removes_both_mappings() {
        let router = Router::new();
        let conn = make_conn(1).await;

        let _ = router.register("bot:a", &conn.handle);
        assert_eq!(router.unregister(&conn.handle).as_deref(), Some("bot:a"));
        assert!(router.lookup("bot:a").is_none());
        assert!(router.is_empty());
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let router = Router::new();
        let conn = make_conn(1).await;

        let _ = router.register("bot:a", &conn.handle);
        assert!(router.unregister(&conn.handle).is_some());
        assert!(router.unregister(&conn.handle).is_none());
    }

    #[tokio::test]
    async fn unregister_unregistered_connection_is_none() {
        let router = Router::new();
        let conn = make_conn(1).await;
        assert!(router.unregister(&conn.handle).is_none());
    }

    #[tokio::test]
    async fn snapshot_and_identities_cover_all_entries() {
        let router = Router::new();
        let a = make_conn(1).await;
        let b = make_conn(2).await;

        let _ = router.register("bot:a", &a.handle);
        let _ = router.register("bot:b", &b.handle);

        let mut identities = router.identities();
        identities.sort();
        assert_eq!(identities, vec!["bot:a", "bot:b"]);

        let snapshot = router.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_bijection(&router);
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_handler() {
        let conn = make_conn(1).await;
        conn.handle.close();
        // The permit is stored, so a later wait resolves immediately.
        conn.handle.closed().await;
    }
}
