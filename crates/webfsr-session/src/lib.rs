//! Pairing sessions for webfsr-remote.
//!
//! A [`PairingSession`] pairs a desktop host with exactly one mobile remote
//! through any [`Rendezvous`](webfsr_protocol::Rendezvous) backend. The
//! crate also carries the pieces either side builds on: the last-code
//! store, the remote's mirror of host state, the host profile and value
//! throttle, retry backoff, and config loading.

pub mod config;
pub mod error;
mod handlers;
pub mod host;
pub mod last_code;
pub mod mirror;
pub mod retry;
pub mod session;
pub mod setup;
pub mod state;

pub use config::Config;
pub use error::SessionError;
pub use handlers::{MessageCallback, PeerCallback};
pub use host::{HostAction, HostProfile, ValueThrottle};
pub use last_code::{FileStore, KeyValueStore, LastCodeStore, MemoryStore, StoreError};
pub use mirror::RemoteMirror;
pub use retry::Backoff;
pub use session::{PairingSession, SessionBuilder, HANDSHAKE, MESSAGE};
pub use state::{SessionEffect, SessionInput, SessionState, SessionStatus};
