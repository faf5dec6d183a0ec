//! Session state machine.
//!
//! [`SessionStatus::apply`] is a pure transition function: it takes one
//! input, updates the status and returns the effects the caller must carry
//! out (send a handshake, fire a callback). The session task owns I/O; this
//! module owns the rules.

use webfsr_types::{HandshakeMessage, PairingCode, PeerId};

/// Error text used when a remote is asked to connect without any code.
pub const MISSING_CODE_ERROR: &str = "no pairing code provided";

/// Error text used when the rendezvous link drops underneath a room.
pub const ROOM_CLOSED_ERROR: &str = "rendezvous connection closed";

/// Connection state of a pairing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No room joined.
    #[default]
    Idle,
    /// Room joined (or being joined), waiting for a counterpart.
    Connecting,
    /// Exactly one peer completed the handshake.
    Connected,
    /// The peer left, the join failed, or the rendezvous dropped.
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Snapshot of a session, published to observers on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub code: Option<PairingCode>,
    pub peer: Option<PeerId>,
    pub error: Option<String>,
    /// Caller-driven retries since the last successful connection.
    pub reconnect_attempt: u32,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Joining the room named by this code.
    Connect(PairingCode),
    /// A remote was asked to connect without a code.
    MissingCode,
    /// The rendezvous refused or failed the join.
    JoinFailed(String),
    /// A member joined the room after us.
    PeerJoined(PeerId),
    /// A member left the room.
    PeerLeft(PeerId),
    /// A handshake message arrived.
    Handshake {
        from: PeerId,
        message: HandshakeMessage,
    },
    /// The room's event stream ended.
    RoomClosed,
    /// The room is being torn down ahead of a new connect.
    Teardown,
    /// Explicit disconnect by the caller.
    Disconnect,
    /// The caller is about to retry.
    Retry,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Send a handshake message to `target`, or broadcast it.
    SendHandshake {
        message: HandshakeMessage,
        target: Option<PeerId>,
    },
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == SessionState::Connecting
    }

    /// Whether a room is (or should be) joined for this status.
    fn in_room(&self) -> bool {
        self.state != SessionState::Idle && self.code.is_some()
    }

    /// Apply one input and return the effects to perform, in order.
    pub fn apply(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        match input {
            SessionInput::Connect(code) => {
                self.state = SessionState::Connecting;
                self.code = Some(code);
                self.peer = None;
                self.error = None;
                Vec::new()
            }
            SessionInput::MissingCode => {
                self.state = SessionState::Disconnected;
                self.peer = None;
                self.error = Some(MISSING_CODE_ERROR.to_string());
                Vec::new()
            }
            SessionInput::JoinFailed(error) => {
                self.state = SessionState::Disconnected;
                self.peer = None;
                self.error = Some(error);
                Vec::new()
            }
            SessionInput::PeerJoined(peer) => {
                // Greet newcomers only while nobody is connected, so a
                // second remote never gets a syn it could ack into a
                // one-sided connection.
                if self.in_room() && self.peer.is_none() {
                    vec![SessionEffect::SendHandshake {
                        message: HandshakeMessage::Syn,
                        target: Some(peer),
                    }]
                } else {
                    Vec::new()
                }
            }
            SessionInput::PeerLeft(peer) => {
                if self.peer.as_ref() != Some(&peer) {
                    return Vec::new();
                }
                self.peer = None;
                self.state = SessionState::Disconnected;
                vec![SessionEffect::PeerDisconnected(peer)]
            }
            SessionInput::Handshake { from, message } => {
                if !self.in_room() || self.peer.is_some() {
                    return Vec::new();
                }
                self.peer = Some(from.clone());
                self.state = SessionState::Connected;
                self.error = None;
                self.reconnect_attempt = 0;

                let mut effects = vec![SessionEffect::PeerConnected(from.clone())];
                if message == HandshakeMessage::Syn {
                    effects.push(SessionEffect::SendHandshake {
                        message: HandshakeMessage::Ack,
                        target: Some(from),
                    });
                }
                effects
            }
            SessionInput::RoomClosed => {
                if self.state == SessionState::Idle {
                    return Vec::new();
                }
                self.state = SessionState::Disconnected;
                self.error = Some(ROOM_CLOSED_ERROR.to_string());
                self.peer
                    .take()
                    .map(SessionEffect::PeerDisconnected)
                    .into_iter()
                    .collect()
            }
            SessionInput::Teardown => {
                self.state = SessionState::Idle;
                self.peer = None;
                Vec::new()
            }
            SessionInput::Disconnect => {
                *self = Self::default();
                Vec::new()
            }
            SessionInput::Retry => {
                self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                Vec::new()
            }
        }
    }
}
