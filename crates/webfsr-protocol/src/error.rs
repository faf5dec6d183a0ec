//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to join room: {0}")]
    Join(String),

    #[error("room has already been left")]
    RoomClosed,

    #[error("unexpected relay reply: {0}")]
    UnexpectedReply(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("endpoint closed")]
    EndpointClosed,

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
