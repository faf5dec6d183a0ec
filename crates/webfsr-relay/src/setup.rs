//! Relay certificate loading and generation.

use std::path::Path;

use tracing::info;
use webfsr_certgen::RelayCertificate;

use crate::error::RelayError;

pub const CERT_FILE: &str = "relay.crt";
pub const KEY_FILE: &str = "relay.key";

/// Load a certificate and key from explicit paths.
pub fn load_certs(cert_path: &Path, key_path: &Path) -> Result<RelayCertificate, RelayError> {
    let cert_pem = std::fs::read_to_string(cert_path)
        .map_err(|e| RelayError::Certificate(format!("failed to read {}: {e}", cert_path.display())))?;
    let key_pem = std::fs::read_to_string(key_path)
        .map_err(|e| RelayError::Certificate(format!("failed to read {}: {e}", key_path.display())))?;
    let fingerprint = webfsr_protocol::tls::pem_fingerprint(&cert_pem)?;
    info!(path = %cert_path.display(), fingerprint = %fingerprint, "loaded relay certificate");
    Ok(RelayCertificate {
        cert_pem,
        key_pem,
        fingerprint,
    })
}

/// Load the relay certificate from `dir`, generating one if missing.
pub fn load_or_generate_certs(dir: &Path, server_name: &str) -> Result<RelayCertificate, RelayError> {
    let cert_path = dir.join(CERT_FILE);
    let key_path = dir.join(KEY_FILE);

    if cert_path.exists() && key_path.exists() {
        return load_certs(&cert_path, &key_path);
    }

    let cert = webfsr_certgen::generate_relay_certificate(server_name)
        .map_err(|e| RelayError::Certificate(format!("failed to generate certificate: {e}")))?;
    write_certs(dir, &cert)?;
    info!(fingerprint = %cert.fingerprint, "generated new relay certificate");
    Ok(cert)
}

/// Write `cert` into `dir` as `relay.crt` / `relay.key`.
pub fn write_certs(dir: &Path, cert: &RelayCertificate) -> Result<(), RelayError> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(CERT_FILE), &cert.cert_pem)?;
    std::fs::write(dir.join(KEY_FILE), &cert.key_pem)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate_certs(dir.path(), "localhost").unwrap();
        assert!(dir.path().join(CERT_FILE).exists());

        let second = load_or_generate_certs(dir.path(), "localhost").unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.key_pem, second.key_pem);
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_certs(&dir.path().join("a.crt"), &dir.path().join("a.key"));
        assert!(matches!(result, Err(RelayError::Certificate(_))));
    }
}
