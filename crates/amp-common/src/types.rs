//! Core type definitions and protocol constants for AMP.

/// An agent identity as declared in a packet's `src` field,
/// conventionally of the form `"kind:name"` (e.g. `"bot:alice"`).
pub type Identity = String;

/// Reserved identity for relay-originated packets. Also a valid
/// destination: packets addressed here get a liveness reply.
pub const SERVER_IDENTITY: &str = "server";

/// Destination prefix that routes a packet to the discovery dispatcher
/// instead of a peer. The remainder of the string selects the query.
pub const DISCOVER_PREFIX: &str = "discover:";

/// Message kinds carried in a packet's `typ` field.
pub mod msg_type {
    /// A request from an agent.
    pub const ASK: u32 = 0;
    /// An offer from an agent, or a reply from the relay.
    pub const REPLY: u32 = 1;
    /// Relay liveness probe; clients filter these.
    pub const HEARTBEAT: u32 = 2;
}

/// Reply bodies sent by the relay, always with `typ = 1` and
/// `src = "server"`, echoing the inbound packet's `id`.
pub mod reply_body {
    /// The server-directed packet was accepted.
    pub const DONE: &str = "done";
    /// The destination identity is not registered.
    pub const OFFLINE: &str = "error:offline";
    /// The destination was found but writing the forwarded frame failed.
    pub const DELIVERY_FAILED: &str = "error:delivery_failed";
    /// The `discover:` suffix is not recognized.
    pub const UNKNOWN_DISCOVERY: &str = "error:unknown_discovery";
}
