//! Common types and utilities shared across the AMP protocol stack.
//!
//! This crate provides:
//! - The wire `Packet` schema and message-kind constants ([`packet`])
//! - The length-prefixed frame codec ([`frame`])
//! - Ed25519 packet signing and verification ([`crypto`])
//! - Protocol constants and the destination grammar ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod frame;
pub mod packet;
pub mod types;

pub use crypto::VerifyError;
pub use frame::FrameError;
pub use packet::Packet;
