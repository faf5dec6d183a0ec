//! Peer identity and session roles.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a room member, assigned by the rendezvous backend.
///
/// Stable for the lifetime of that member's presence in one room; a peer
/// that leaves and rejoins gets a new identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Which side of the pairing this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Desktop side: mints codes and accepts a single remote.
    Host,
    /// Mobile side: joins a host's code.
    Remote,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_serializes_transparently() {
        let id = PeerId::new("peer-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"peer-7\"");
        assert_eq!(id.to_string(), "peer-7");
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Host.to_string(), "host");
        assert_eq!(Role::Remote.to_string(), "remote");
    }
}
