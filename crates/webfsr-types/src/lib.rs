//! Shared types for webfsr-remote.
//!
//! This crate contains the types exchanged between a desktop host and a
//! mobile remote: pairing codes, peer identifiers, session roles, the
//! handshake messages and the application message protocol.

pub mod code;
pub mod message;
pub mod peer;

pub use code::{CodeError, PairingCode, CODE_PREFIX};
pub use message::{
    ApplicationMessage, Direction, HandshakeMessage, ProfileSyncPayload, SensorReading, Theme,
};
pub use peer::{PeerId, Role};
