//! Protocol message types.
//!
//! Two actions share a room: `handshake` carries [`HandshakeMessage`] while
//! peers agree on a counterpart, `message` carries [`ApplicationMessage`]
//! once they have. The serde form mirrors the JSON protocol spoken by the
//! browser dashboards (`{"type": "threshold", "index": 2, "value": 600}`);
//! the bincode form is what travels over the relay.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Handshake exchanged while establishing the single connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandshakeMessage {
    /// A peer announcing its presence.
    Syn,
    /// A peer confirming a received `Syn`.
    Ack,
}

/// Colour scheme forwarded to the remote so it renders like the desktop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

/// Full profile and visual-state snapshot sent desktop -> mobile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSyncPayload {
    pub thresholds: Vec<u32>,
    pub sensor_labels: Vec<String>,
    pub sensor_colors: Vec<String>,
    pub threshold_color: String,
    pub use_threshold_color: bool,
    pub use_single_color: bool,
    pub single_bar_color: String,
    pub is_locked: bool,
    pub theme: Theme,
}

/// One sample of raw sensor values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SensorReading {
    pub values: Vec<u32>,
    /// Milliseconds since the Unix epoch on the sending machine.
    pub timestamp: u64,
}

/// Which way a message is expected to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DesktopToMobile,
    MobileToDesktop,
}

/// Application messages exchanged with the connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApplicationMessage {
    /// Full profile snapshot.
    Sync { payload: ProfileSyncPayload },

    /// Periodic sensor values.
    Values { payload: SensorReading },

    /// A single threshold edit made on the remote.
    Threshold { index: u32, value: u32 },

    /// Remote is ready for an initial `Sync`.
    Ready,

    /// Liveness probe. Declared but not driven by a timer.
    Ping,

    /// Liveness reply.
    Pong,
}

impl ApplicationMessage {
    /// The direction this variant is sent in.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Sync { .. } | Self::Values { .. } | Self::Ping => Direction::DesktopToMobile,
            Self::Threshold { .. } | Self::Ready | Self::Pong => Direction::MobileToDesktop,
        }
    }

    /// Tag used in the JSON form, handy for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
            Self::Values { .. } => "values",
            Self::Threshold { .. } => "threshold",
            Self::Ready => "ready",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> ProfileSyncPayload {
        ProfileSyncPayload {
            thresholds: vec![512, 600, 480, 700],
            sensor_labels: vec!["Left".into(), "Down".into(), "Up".into(), "Right".into()],
            sensor_colors: vec!["#ff0000".into(), "#00ff00".into()],
            threshold_color: "#ffffff".into(),
            use_threshold_color: true,
            use_single_color: false,
            single_bar_color: "#ff0000".into(),
            is_locked: false,
            theme: Theme::Light,
        }
    }

    #[test]
    fn threshold_json_matches_dashboard_protocol() {
        let msg = ApplicationMessage::Threshold {
            index: 2,
            value: 600,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "threshold", "index": 2, "value": 600})
        );
    }

    #[test]
    fn sync_json_uses_camel_case_payload() {
        let msg = ApplicationMessage::Sync {
            payload: sample_payload(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "sync");
        assert_eq!(json["payload"]["useThresholdColor"], true);
        assert_eq!(json["payload"]["theme"], "light");
        assert_eq!(json["payload"]["sensorLabels"][3], "Right");
    }

    #[test]
    fn unit_variants_parse_from_tag_only() {
        let ready: ApplicationMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, ApplicationMessage::Ready);
        let syn: HandshakeMessage = serde_json::from_str(r#"{"type":"syn"}"#).unwrap();
        assert_eq!(syn, HandshakeMessage::Syn);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let result = serde_json::from_str::<ApplicationMessage>(r#"{"type":"reboot"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn sync_survives_bincode() {
        let msg = ApplicationMessage::Sync {
            payload: sample_payload(),
        };
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&msg, config).unwrap();
        let (decoded, _): (ApplicationMessage, _) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn directions() {
        assert_eq!(
            ApplicationMessage::Ready.direction(),
            Direction::MobileToDesktop
        );
        assert_eq!(
            ApplicationMessage::Values {
                payload: SensorReading {
                    values: vec![1, 2],
                    timestamp: 0,
                }
            }
            .direction(),
            Direction::DesktopToMobile
        );
        assert_eq!(ApplicationMessage::Pong.kind(), "pong");
    }
}
