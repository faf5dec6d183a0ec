//! TLS configuration for the relay link.

use std::sync::Arc;

use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tracing::{debug, warn};

use crate::error::ProtocolError;

/// ALPN identifier for the relay protocol.
pub const ALPN: &[u8] = b"webfsr-relay/1";

/// Build a quinn `ServerConfig` from PEM-encoded cert and key.
pub fn server_config(cert_pem: &str, key_pem: &str) -> Result<quinn::ServerConfig, ProtocolError> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProtocolError::Tls(e.to_string()))?;

    tls_config.alpn_protocols = vec![ALPN.to_vec()];

    let config = quinn::ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ProtocolError::Tls(e.to_string()))?,
    ));
    debug!("built relay TLS config");
    Ok(config)
}

/// Build a quinn `ClientConfig` for talking to the relay.
///
/// Relays run with self-signed certificates, so there is no chain to
/// validate. A configured fingerprint pins the relay certificate; without
/// one every certificate is accepted. Handshake signatures are always
/// checked against the presented certificate.
pub fn client_config(pinned_fingerprint: Option<String>) -> Result<quinn::ClientConfig, ProtocolError> {
    if pinned_fingerprint.is_none() {
        warn!("no relay fingerprint configured, accepting any relay certificate");
    }

    let algorithms = rustls::crypto::ring::default_provider().signature_verification_algorithms;
    let mut tls_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(RelayCertVerifier {
            pinned_fingerprint,
            algorithms,
        }))
        .with_no_client_auth();

    tls_config.alpn_protocols = vec![ALPN.to_vec()];

    let config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
            .map_err(|e| ProtocolError::Tls(e.to_string()))?,
    ));
    debug!("built relay client TLS config");
    Ok(config)
}

/// Fingerprint of the first certificate in `cert_pem`.
pub fn pem_fingerprint(cert_pem: &str) -> Result<String, ProtocolError> {
    let certs = parse_certs(cert_pem)?;
    Ok(webfsr_certgen::fingerprint(certs[0].as_ref()))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, ProtocolError> {
    let mut reader = std::io::BufReader::new(pem.as_bytes());
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::Tls(format!("failed to parse certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ProtocolError::Tls(
            "no certificates found in PEM".to_string(),
        ));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>, ProtocolError> {
    let mut reader = std::io::BufReader::new(pem.as_bytes());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ProtocolError::Tls(format!("failed to parse key PEM: {e}")))?
        .ok_or_else(|| ProtocolError::Tls("no private key found in PEM".to_string()))
}

/// Accepts the relay certificate by fingerprint (or unconditionally).
struct RelayCertVerifier {
    pinned_fingerprint: Option<String>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl std::fmt::Debug for RelayCertVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCertVerifier")
            .field("pinned_fingerprint", &self.pinned_fingerprint)
            .finish_non_exhaustive()
    }
}

impl rustls::client::danger::ServerCertVerifier for RelayCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        if let Some(expected) = &self.pinned_fingerprint {
            let actual = webfsr_certgen::fingerprint(end_entity.as_ref());
            if !actual.eq_ignore_ascii_case(expected) {
                warn!(expected = %expected, actual = %actual, "relay certificate fingerprint mismatch");
                return Err(rustls::Error::InvalidCertificate(
                    rustls::CertificateError::ApplicationVerificationFailure,
                ));
            }
        }
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
