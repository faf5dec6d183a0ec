//! Certificate generation for the webfsr relay.
//!
//! Relays present a self-signed certificate. Clients can pin it by its
//! SHA-256 fingerprint, which is printed when the certificate is created.

pub mod error;

pub use error::CertgenError;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};

/// A generated certificate and private key pair.
pub struct RelayCertificate {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded private key.
    pub key_pem: String,
    /// `SHA256:`-prefixed colon-separated fingerprint of the DER certificate.
    pub fingerprint: String,
}

/// Generate a self-signed relay certificate.
///
/// Valid for `server_name` plus `localhost` and `127.0.0.1`, so a relay can
/// be reached by name or on loopback with the same certificate.
pub fn generate_relay_certificate(server_name: &str) -> Result<RelayCertificate, CertgenError> {
    let key_pair = KeyPair::generate().map_err(|e| CertgenError::Generation(e.to_string()))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, server_name);
    dn.push(DnType::OrganizationName, "webfsr relay");
    params.distinguished_name = dn;

    let mut names = vec![dns_name(server_name)?];
    if server_name != "localhost" {
        names.push(dns_name("localhost")?);
    }
    names.push(SanType::IpAddress(std::net::IpAddr::V4(
        std::net::Ipv4Addr::LOCALHOST,
    )));
    params.subject_alt_names = names;

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertgenError::Generation(e.to_string()))?;

    Ok(RelayCertificate {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        fingerprint: fingerprint(cert.der()),
    })
}

/// Fingerprint of DER-encoded certificate bytes, as `SHA256:ab:cd:...`.
pub fn fingerprint(der: &[u8]) -> String {
    use std::fmt::Write;
    let digest = ring::digest::digest(&ring::digest::SHA256, der);
    let mut out = String::from("SHA256:");
    for (i, byte) in digest.as_ref().iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn dns_name(name: &str) -> Result<SanType, CertgenError> {
    let ia5 = name
        .try_into()
        .map_err(|e: rcgen::Error| CertgenError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(SanType::DnsName(ia5))
}
