//! Relay errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("room name must not be empty")]
    EmptyRoom,

    #[error("expected Join as the first request")]
    NotJoined,

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] webfsr_protocol::ProtocolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
