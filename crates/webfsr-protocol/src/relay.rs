//! Messages spoken on a relay control stream.
//!
//! A client opens one bidirectional stream per room, sends `Join` and waits
//! for `Joined`. After that the client sends `Send`/`Leave` and the relay
//! pushes membership changes and deliveries.

use bincode::{Decode, Encode};
use webfsr_types::PeerId;

/// Client -> relay.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum RelayRequest {
    /// First frame on a stream: enter `room`.
    Join { room: String },

    /// Forward `payload` on `action` to `target`, or to every other member.
    Send {
        action: String,
        payload: Vec<u8>,
        target: Option<PeerId>,
    },

    /// Leave the room; the relay closes the stream afterwards.
    Leave,
}

/// Relay -> client.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum RelayEvent {
    /// Reply to `Join` with the identifier assigned to this member.
    Joined { peer: PeerId },

    /// Another member entered the room.
    PeerJoined(PeerId),

    /// Another member left the room.
    PeerLeft(PeerId),

    /// A payload forwarded from another member.
    Deliver {
        action: String,
        payload: Vec<u8>,
        from: PeerId,
    },

    /// The relay refused a request.
    Error { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_payload, encode_frame, frame_len};

    #[test]
    fn deliver_frame_roundtrip() {
        let event = RelayEvent::Deliver {
            action: "message".to_string(),
            payload: vec![4, 5, 6],
            from: PeerId::new("a1"),
        };
        let bytes = encode_frame(&event).unwrap();
        let len = frame_len(bytes[..4].try_into().unwrap()).unwrap();
        let decoded: RelayEvent = decode_payload(&bytes[4..4 + len]).unwrap();
        assert_eq!(decoded, event);
    }
}
