//! Session errors.
//!
//! Transport failures during a session never come back as `Err`; they are
//! reflected in [`SessionStatus::error`](crate::SessionStatus). These
//! variants cover setup: loading config, parsing codes, opening stores.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid pairing code: {0}")]
    Code(#[from] webfsr_types::CodeError),

    #[error("settings store error: {0}")]
    Store(#[from] crate::last_code::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] webfsr_protocol::ProtocolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
