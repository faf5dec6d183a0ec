//! Configuration loaded from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the signaling relay lives, and how it is served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address clients connect to.
    #[serde(default = "default_relay_address")]
    pub address: String,
    /// Address the relay server binds.
    #[serde(default = "default_relay_bind")]
    pub bind: String,
    /// TLS server name presented by the relay certificate.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Pin the relay certificate to this SHA-256 fingerprint.
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: default_relay_address(),
            bind: default_relay_bind(),
            server_name: default_server_name(),
            fingerprint: None,
            cert_path: None,
            key_path: None,
        }
    }
}

/// Session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Upper bound on `values` broadcasts per second.
    #[serde(default = "default_values_rate_hz")]
    pub values_rate_hz: u32,
    /// Origin used when printing share links.
    #[serde(default = "default_share_origin")]
    pub share_origin: String,
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn values_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.values_rate_hz.max(1)))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            values_rate_hz: default_values_rate_hz(),
            share_origin: default_share_origin(),
        }
    }
}

/// Caller-driven retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_relay_address() -> String {
    "127.0.0.1:24810".to_string()
}

fn default_relay_bind() -> String {
    "0.0.0.0:24810".to_string()
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_settle_delay_ms() -> u64 {
    10
}

fn default_values_rate_hz() -> u32 {
    30
}

fn default_share_origin() -> String {
    "https://webfsr.com".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("address = \"127.0.0.1:24810\""));
        assert!(toml_str.contains("values_rate_hz = 30"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.relay.server_name, "localhost");
        assert_eq!(config.session.settle_delay(), Duration::from_millis(10));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.relay.fingerprint, None);
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
log_level = "debug"

[relay]
address = "10.0.0.5:24810"
server_name = "relay.local"
fingerprint = "SHA256:abc123"

[session]
values_rate_hz = 10

[reconnect]
max_attempts = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.relay.address, "10.0.0.5:24810");
        assert_eq!(config.relay.bind, "0.0.0.0:24810");
        assert_eq!(config.relay.fingerprint.as_deref(), Some("SHA256:abc123"));
        assert_eq!(config.session.values_interval(), Duration::from_millis(100));
        assert_eq!(config.session.share_origin, "https://webfsr.com");
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.initial_delay_ms, 500);
    }

    #[test]
    fn zero_rate_does_not_divide_by_zero() {
        let session = SessionConfig {
            values_rate_hz: 0,
            ..SessionConfig::default()
        };
        assert_eq!(session.values_interval(), Duration::from_secs(1));
    }
}
