//! QUIC signaling relay for webfsr-remote.
//!
//! Hosts named rooms. Members join over one control stream per room and
//! exchange opaque payloads, either addressed to one member or broadcast to
//! the rest, while the relay announces arrivals and departures.

pub mod error;
pub mod registry;
pub mod server;
pub mod setup;

pub use error::RelayError;
pub use registry::RoomRegistry;
pub use server::{RelayHandle, RelayServer};
pub use setup::{load_certs, load_or_generate_certs, write_certs};
