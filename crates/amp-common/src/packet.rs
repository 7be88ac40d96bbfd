//! The AMP wire message.
//!
//! `Packet` is the only message exchanged on the wire. It travels inside a
//! length-prefixed frame (see [`crate::frame`]) as Protocol Buffers bytes
//! with fixed field numbers 1..10. Proto3 semantics apply: fields at their
//! default value are omitted from the encoding, which is what makes the
//! canonical signing bytes (sig and pk cleared, everything else verbatim)
//! reproducible across implementations.

use crate::types::{msg_type, SERVER_IDENTITY};

/// The sole wire message of the AMP protocol.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Packet {
    /// Ed25519 signature over the canonical signing bytes; exactly 64 bytes
    /// on admissible packets, cleared when computing the signing payload.
    #[prost(bytes = "vec", tag = "1")]
    pub sig: Vec<u8>,
    /// Sender's Ed25519 public key; exactly 32 bytes on admissible packets,
    /// cleared when computing the signing payload.
    #[prost(bytes = "vec", tag = "2")]
    pub pk: Vec<u8>,
    /// Message kind, one of [`msg_type`].
    #[prost(uint32, tag = "3")]
    pub typ: u32,
    /// Correlation token, echoed verbatim in relay replies.
    #[prost(string, tag = "4")]
    pub id: String,
    /// Declared sender identity, conventionally `"kind:name"`.
    #[prost(string, tag = "5")]
    pub src: String,
    /// Destination selector: empty or `"server"`, a `discover:` query,
    /// or a peer identity to forward to.
    #[prost(string, tag = "6")]
    pub dst: String,
    /// Opaque UTF-8 payload.
    #[prost(string, tag = "7")]
    pub body: String,
    /// Fee offer, transported unmodified; the relay enforces no policy.
    #[prost(uint64, tag = "8")]
    pub fee: u64,
    /// Time-to-live hint, transported unmodified; the relay enforces no policy.
    #[prost(uint32, tag = "9")]
    pub ttl: u32,
    /// Optional memory-commit blob, counted per sender for observability.
    #[prost(bytes = "vec", tag = "10")]
    pub scar: Vec<u8>,
}

impl Packet {
    /// Builds a relay reply echoing `id`, with `typ = 1` and `src = "server"`.
    #[must_use]
    pub fn reply(id: &str, body: impl Into<String>) -> Self {
        Self {
            typ: msg_type::REPLY,
            id: id.to_owned(),
            src: SERVER_IDENTITY.to_owned(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Builds a relay heartbeat: `typ = 2`, `src = "server"`, all other
    /// fields at their defaults.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            typ: msg_type::HEARTBEAT,
            src: SERVER_IDENTITY.to_owned(),
            ..Self::default()
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use prost::Message;

    fn arb_packet() -> impl Strategy<Value = Packet> {
        (
            prop::collection::vec(any::<u8>(), 0..80),
            prop::collection::vec(any::<u8>(), 0..40),
            any::<u32>(),
            ".{0,32}",
            ".{0,32}",
            ".{0,32}",
            ".{0,256}",
            any::<u64>(),
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(
                |(sig, pk, typ, id, src, dst, body, fee, ttl, scar)| Packet {
                    sig,
                    pk,
                    typ,
                    id,
                    src,
                    dst,
                    body,
                    fee,
                    ttl,
                    scar,
                },
            )
    }

    proptest! {
        #[test]
        fn packet_encode_decode_roundtrip(packet in arb_packet()) {
            let bytes = packet.encode_to_vec();
            let decoded = Packet::decode(bytes.as_slice()).unwrap();
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn reencoding_is_stable(packet in arb_packet()) {
            let bytes = packet.encode_to_vec();
            let decoded = Packet::decode(bytes.as_slice()).unwrap();
            prop_assert_eq!(decoded.encode_to_vec(), bytes);
        }
    }
}
