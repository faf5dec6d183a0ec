//! The rendezvous contract.
//!
//! A [`Rendezvous`] joins rooms named by opaque strings. Joining yields a
//! [`Room`] handle for sending plus a channel of [`RoomEvent`]s for
//! membership changes and incoming payloads. Named sub-channels within a
//! room are modelled by [`Action`], which fixes the payload type for a name.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bincode::{Decode, Encode};
use tokio::sync::mpsc;
use webfsr_types::PeerId;

use crate::error::ProtocolError;
use crate::wire;

/// Capacity of the per-room event channel handed back by `join`.
pub const EVENT_BUFFER: usize = 1024;

/// Something that happened in a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A member joined after us.
    PeerJoined(PeerId),
    /// A member left (or its connection dropped).
    PeerLeft(PeerId),
    /// A payload sent on a named action.
    Action {
        name: String,
        payload: Vec<u8>,
        from: PeerId,
    },
}

/// Handle to a joined room.
#[async_trait]
pub trait Room: Send + Sync + 'static {
    /// The room name this handle was joined with.
    fn room_id(&self) -> &str;

    /// Our own identifier within the room.
    fn local_peer(&self) -> &PeerId;

    /// Send `payload` on `action` to `target`, or to every other member.
    async fn send(
        &self,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> Result<(), ProtocolError>;

    /// Leave the room. Calling this more than once is a no-op.
    async fn leave(&self) -> Result<(), ProtocolError>;
}

/// Result of a successful join.
pub struct JoinedRoom {
    pub room: Arc<dyn Room>,
    /// Closed by the backend when the room handle is gone for good.
    pub events: mpsc::Receiver<RoomEvent>,
}

/// Something that can put us in a room with other peers.
#[async_trait]
pub trait Rendezvous: Send + Sync + 'static {
    async fn join(&self, room_id: &str) -> Result<JoinedRoom, ProtocolError>;
}

/// A named, typed sub-channel of a room.
pub struct Action<T> {
    name: &'static str,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Action<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether an incoming action name belongs to this channel.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name
    }
}

impl<T: Encode + Decode<()>> Action<T> {
    /// Encode `msg` and send it through `room`.
    pub async fn send(
        &self,
        room: &dyn Room,
        msg: &T,
        target: Option<&PeerId>,
    ) -> Result<(), ProtocolError> {
        let payload = wire::encode_payload(msg)?;
        room.send(self.name, payload, target).await
    }

    /// Decode a payload received on this channel.
    pub fn decode(&self, payload: &[u8]) -> Result<T, ProtocolError> {
        wire::decode_payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webfsr_types::HandshakeMessage;

    const HANDSHAKE: Action<HandshakeMessage> = Action::new("handshake");

    #[test]
    fn action_matches_only_its_name() {
        assert!(HANDSHAKE.matches("handshake"));
        assert!(!HANDSHAKE.matches("message"));
        assert_eq!(HANDSHAKE.name(), "handshake");
    }

    #[test]
    fn action_decodes_what_wire_encodes() {
        let payload = wire::encode_payload(&HandshakeMessage::Syn).unwrap();
        assert_eq!(HANDSHAKE.decode(&payload).unwrap(), HandshakeMessage::Syn);
    }
}
