use amp_common::crypto;
use amp_common::frame;
use amp_common::packet::Packet;
use amp_common::types::msg_type;
use amps::config::ServerConfig;
use amps::server::ServerState;
use ed25519_dalek::SigningKey;
use prost::Message;
use rand::rngs::OsRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        heartbeat_interval: 60,
    }
}

async fn spawn_server(config: ServerConfig) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(config));

    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = amps::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    spawn_server(test_config("127.0.0.1:0".parse().unwrap())).await
}

pub async fn start_server_with_heartbeat(interval_secs: u64) -> (SocketAddr, Arc<ServerState>) {
    let mut config = test_config("127.0.0.1:0".parse().unwrap());
    config.heartbeat_interval = interval_secs;
    let (addr, state) = spawn_server(config).await;
    amps::heartbeat::spawn(Arc::clone(&state));
    (addr, state)
}

/// A framed-TCP client that signs every packet with its own keypair.
pub struct TestClient {
    pub stream: TcpStream,
    pub key: SigningKey,
    pub identity: String,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr, identity: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            key: SigningKey::generate(&mut OsRng),
            identity: identity.to_owned(),
        }
    }

    /// Builds a signed ask packet from this client's identity.
    pub fn signed_packet(&self, id: &str, dst: &str, body: &str) -> Packet {
        let mut packet = Packet {
            typ: msg_type::ASK,
            id: id.to_owned(),
            src: self.identity.clone(),
            dst: dst.to_owned(),
            body: body.to_owned(),
            ttl: 60,
            ..Packet::default()
        };
        crypto::sign_packet(&self.key, &mut packet);
        packet
    }

    /// Signs an arbitrary packet with this client's key.
    pub fn sign(&self, packet: &mut Packet) {
        crypto::sign_packet(&self.key, packet);
    }

    pub async fn send(&mut self, packet: &Packet) {
        frame::write_frame(&mut self.stream, &packet.encode_to_vec())
            .await
            .unwrap();
    }

    /// Writes raw bytes, bypassing the frame codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn recv(&mut self) -> Packet {
        let payload = tokio::time::timeout(Duration::from_secs(5), frame::read_frame(&mut self.stream))
            .await
            .expect("timeout waiting for packet")
            .unwrap();
        Packet::decode(payload.as_slice()).unwrap()
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Packet> {
        match tokio::time::timeout(timeout, frame::read_frame(&mut self.stream)).await {
            Ok(Ok(payload)) => Some(Packet::decode(payload.as_slice()).unwrap()),
            _ => None,
        }
    }

    /// Waits until the server closes this connection. Returns `false` if
    /// the connection is still open (or delivered a packet) at the timeout.
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, frame::read_frame(&mut self.stream)).await,
            Ok(Err(_))
        )
    }

    /// Registers this client's identity by pinging the server.
    pub async fn register(&mut self, id: &str) {
        let packet = self.signed_packet(id, "server", "ping");
        self.send(&packet).await;
        let reply = self.recv().await;
        assert_eq!(reply.body, "done", "registration ping should succeed");
    }
}
