//! Relay connections and control-stream framing.

use std::net::SocketAddr;

use bincode::{Decode, Encode};
use quinn::{Connection, ReadExactError, RecvStream, SendStream};
use tracing::trace;

use crate::error::ProtocolError;
use crate::wire;

pub(crate) fn connection_error(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Connection(e.to_string())
}

/// A QUIC connection between a relay client and the relay.
///
/// Each connection carries exactly one room membership on one
/// bidirectional control stream.
#[derive(Clone)]
pub struct PeerConnection {
    connection: Connection,
}

impl PeerConnection {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Open the control stream (client side).
    pub async fn open_control_stream(
        &self,
    ) -> Result<(MessageSender, MessageReceiver), ProtocolError> {
        let (send, recv) = self.connection.open_bi().await.map_err(connection_error)?;
        Ok((MessageSender { stream: send }, MessageReceiver { stream: recv }))
    }

    /// Accept the control stream (relay side).
    pub async fn accept_control_stream(
        &self,
    ) -> Result<(MessageSender, MessageReceiver), ProtocolError> {
        let (send, recv) = self.connection.accept_bi().await.map_err(connection_error)?;
        Ok((MessageSender { stream: send }, MessageReceiver { stream: recv }))
    }

    pub fn close(&self) {
        self.connection.close(quinn::VarInt::from_u32(0), b"bye");
    }
}

/// Writing half of a control stream.
pub struct MessageSender {
    stream: SendStream,
}

impl MessageSender {
    /// Encode `msg` and write it as one frame.
    pub async fn send<T: Encode>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let frame = wire::encode_frame(msg)?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(connection_error)?;
        trace!(len = frame.len(), "sent frame");
        Ok(())
    }

    /// Signal that no more frames follow.
    pub fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream.finish().map_err(connection_error)
    }
}

/// Reading half of a control stream.
pub struct MessageReceiver {
    stream: RecvStream,
}

impl MessageReceiver {
    /// Read and decode one frame. `None` means the peer finished the
    /// stream cleanly between frames.
    pub async fn recv<T: Decode<()>>(&mut self) -> Result<Option<T>, ProtocolError> {
        let mut header = [0u8; 4];
        if !self.fill(&mut header).await? {
            return Ok(None);
        }

        let len = wire::frame_len(header)?;
        let mut payload = vec![0u8; len];
        if !self.fill(&mut payload).await? {
            return Err(ProtocolError::StreamClosed);
        }

        trace!(len, "received frame");
        wire::decode_payload(&payload).map(Some)
    }

    /// Fill `buf` completely; `false` if the stream ended first.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<bool, ProtocolError> {
        match self.stream.read_exact(buf).await {
            Ok(()) => Ok(true),
            Err(ReadExactError::FinishedEarly(_)) => Ok(false),
            Err(ReadExactError::ReadError(e)) => Err(connection_error(e)),
        }
    }
}
