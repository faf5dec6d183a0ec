//! Config loading, settings location and relay client setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use webfsr_protocol::{QuicRendezvous, QuicTransport};

use crate::config::{Config, RelayConfig};
use crate::error::SessionError;
use crate::last_code::{FileStore, LastCodeStore};

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config, SessionError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| SessionError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| SessionError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("webfsr-remote")
}

fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Settings file holding the last pairing code.
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

/// Open the last-code store at `path`, or the default settings file.
pub fn open_last_code_store(path: Option<&Path>) -> LastCodeStore {
    let path = path.map_or_else(settings_path, Path::to_path_buf);
    debug!(path = %path.display(), "opening settings store");
    LastCodeStore::open(FileStore::new(path))
}

/// Resolve the relay address, which may be a host name.
pub async fn resolve_relay(address: &str) -> Result<SocketAddr, SessionError> {
    if let Ok(addr) = address.parse() {
        return Ok(addr);
    }
    tokio::net::lookup_host(address)
        .await
        .map_err(|e| SessionError::Config(format!("failed to resolve relay {address}: {e}")))?
        .next()
        .ok_or_else(|| SessionError::Config(format!("relay {address} resolved to no address")))
}

/// Build a rendezvous client for the configured relay.
pub async fn connect_rendezvous(relay: &RelayConfig) -> Result<QuicRendezvous, SessionError> {
    let addr = resolve_relay(&relay.address).await?;
    let local: SocketAddr = if addr.is_ipv6() {
        ([0u16; 8], 0).into()
    } else {
        ([0, 0, 0, 0], 0).into()
    };
    let transport = QuicTransport::client(local, relay.fingerprint.clone())?;
    info!(relay = %addr, server_name = %relay.server_name, "relay client ready");
    Ok(QuicRendezvous::new(transport, addr, relay.server_name.clone()))
}
