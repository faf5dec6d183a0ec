//! QUIC endpoints for the relay link.

use std::net::SocketAddr;

use quinn::Endpoint;
use tracing::{debug, info};

use crate::connection::{connection_error, PeerConnection};
use crate::error::ProtocolError;
use crate::tls;

/// A quinn endpoint on either end of the relay link.
///
/// The relay binds a server endpoint and accepts; clients bind a
/// client-only endpoint and dial once per joined room.
#[derive(Clone)]
pub struct QuicTransport {
    endpoint: Endpoint,
}

fn install_crypto_provider() {
    // Fails harmlessly when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

impl QuicTransport {
    /// Bind a relay endpoint presenting the given certificate.
    pub fn bind(addr: SocketAddr, cert_pem: &str, key_pem: &str) -> Result<Self, ProtocolError> {
        install_crypto_provider();
        let endpoint =
            Endpoint::server(tls::server_config(cert_pem, key_pem)?, addr).map_err(connection_error)?;
        info!(addr = %addr, "relay endpoint bound");
        Ok(Self { endpoint })
    }

    /// Bind a client endpoint.
    ///
    /// With `pinned_fingerprint` set, only a relay presenting that exact
    /// certificate is accepted; otherwise any certificate is.
    pub fn client(addr: SocketAddr, pinned_fingerprint: Option<String>) -> Result<Self, ProtocolError> {
        install_crypto_provider();
        let mut endpoint = Endpoint::client(addr).map_err(connection_error)?;
        endpoint.set_default_client_config(tls::client_config(pinned_fingerprint)?);
        debug!(addr = %addr, "client endpoint bound");
        Ok(Self { endpoint })
    }

    /// Wait for the next client.
    ///
    /// Fails with [`ProtocolError::EndpointClosed`] once the endpoint has
    /// been closed; any other error concerns a single failed handshake.
    pub async fn accept(&self) -> Result<PeerConnection, ProtocolError> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or(ProtocolError::EndpointClosed)?;
        let connection = incoming.await.map_err(connection_error)?;
        debug!(remote = %connection.remote_address(), "accepted relay client");
        Ok(PeerConnection::new(connection))
    }

    /// Dial the relay at `addr`, expecting a certificate for `server_name`.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> Result<PeerConnection, ProtocolError> {
        let connecting = self
            .endpoint
            .connect(addr, server_name)
            .map_err(connection_error)?;
        let connection = connecting.await.map_err(connection_error)?;
        debug!(relay = %addr, "connected to relay");
        Ok(PeerConnection::new(connection))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        self.endpoint.local_addr().map_err(connection_error)
    }

    /// Close the endpoint and every connection on it.
    pub fn close(&self) {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"shutdown");
        debug!("endpoint closed");
    }
}
