//! Ed25519 packet signing and verification.
//!
//! The signing payload of a packet is the packet itself re-encoded with
//! `sig` and `pk` cleared; every other field keeps its transmitted value.
//! Because proto3 omits fields at their default value, clients and relay
//! agree byte-for-byte on this payload without further normalization.

use crate::packet::Packet;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use prost::Message;
use thiserror::Error;

/// Why a packet failed the admissibility check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// `sig` or `pk` is empty; the packet was sent unsigned.
    #[error("packet is unsigned")]
    Unsigned,
    /// `pk` is present but not a 32-byte Ed25519 public key.
    #[error("malformed public key: expected {expected} bytes, got {actual}")]
    MalformedKey {
        /// Required key length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },
    /// `sig` is present but not a 64-byte Ed25519 signature.
    #[error("malformed signature: expected {expected} bytes, got {actual}")]
    MalformedSignature {
        /// Required signature length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },
    /// The signature does not verify over the signing bytes under `pk`.
    #[error("signature does not verify")]
    BadSignature,
}

/// Returns the canonical signing bytes of `packet`: its encoding with
/// `sig` and `pk` cleared and every other field copied verbatim.
#[must_use]
pub fn signing_bytes(packet: &Packet) -> Vec<u8> {
    let mut unsigned = packet.clone();
    unsigned.sig.clear();
    unsigned.pk.clear();
    unsigned.encode_to_vec()
}

/// Signs `packet` in place: computes the Ed25519 signature over the
/// canonical signing bytes and attaches it together with the public key.
/// Any previous `sig`/`pk` values are discarded first.
pub fn sign_packet(key: &SigningKey, packet: &mut Packet) {
    packet.sig.clear();
    packet.pk.clear();
    let signature = key.sign(&packet.encode_to_vec());
    packet.sig = signature.to_bytes().to_vec();
    packet.pk = key.verifying_key().to_bytes().to_vec();
}

/// Checks that `packet` is admissible: `pk` is a well-formed public key,
/// `sig` a well-formed signature, and the signature verifies over the
/// canonical signing bytes.
///
/// # Errors
///
/// Returns a [`VerifyError`] describing the first check that failed.
pub fn verify_packet(packet: &Packet) -> Result<(), VerifyError> {
    if packet.sig.is_empty() || packet.pk.is_empty() {
        return Err(VerifyError::Unsigned);
    }
    let pk: [u8; PUBLIC_KEY_LENGTH] =
        packet
            .pk
            .as_slice()
            .try_into()
            .map_err(|_| VerifyError::MalformedKey {
                expected: PUBLIC_KEY_LENGTH,
                actual: packet.pk.len(),
            })?;
    let sig: [u8; SIGNATURE_LENGTH] =
        packet
            .sig
            .as_slice()
            .try_into()
            .map_err(|_| VerifyError::MalformedSignature {
                expected: SIGNATURE_LENGTH,
                actual: packet.sig.len(),
            })?;

    let key = VerifyingKey::from_bytes(&pk).map_err(|_| VerifyError::BadSignature)?;
    let signature = Signature::from_bytes(&sig);
    key.verify(&signing_bytes(packet), &signature)
        .map_err(|_| VerifyError::BadSignature)
}
