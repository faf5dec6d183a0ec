//! Rendezvous contract and transports for webfsr-remote.
//!
//! A pairing session only needs a way to join a named room, hear about
//! members coming and going, and exchange named payloads with them. This
//! crate defines that contract ([`Rendezvous`] / [`Room`]), the bincode wire
//! codec, an in-process backend for tests and local use, and a client for
//! the QUIC signaling relay (via quinn).

pub mod connection;
pub mod error;
pub mod memory;
pub mod quic;
pub mod relay;
pub mod rendezvous;
pub mod tls;
pub mod transport;
pub mod wire;

pub use connection::{MessageReceiver, MessageSender, PeerConnection};
pub use error::ProtocolError;
pub use memory::{MemoryRendezvous, SentFrame};
pub use quic::QuicRendezvous;
pub use relay::{RelayEvent, RelayRequest};
pub use rendezvous::{Action, JoinedRoom, Rendezvous, Room, RoomEvent, EVENT_BUFFER};
pub use transport::QuicTransport;
