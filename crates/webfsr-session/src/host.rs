//! Host-side profile and value throttling.

use std::time::{Duration, Instant};

use tracing::{debug, info};
use webfsr_types::{ApplicationMessage, ProfileSyncPayload, SensorReading, Theme};

use crate::mirror::now_ms;

/// Threshold given to sensors nobody has tuned yet.
pub const DEFAULT_THRESHOLD: u32 = 512;

/// Default `values` broadcast rate.
pub const DEFAULT_VALUES_RATE_HZ: u32 = 30;

const DEFAULT_SENSOR_COLORS: [&str; 6] = [
    "#3a7da3", "#d4607c", "#8670d4", "#d49b20", "#459ea0", "#d45478",
];

/// What the host should do after handling a remote's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Send a fresh `sync` to the remote.
    Resync,
    /// A threshold changed: write `serial_command` to the pad, then resync.
    ThresholdChanged { serial_command: String },
}

/// The desktop's active profile, as shared with the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    profile: ProfileSyncPayload,
}

impl HostProfile {
    pub fn new(sensor_count: usize) -> Self {
        Self {
            profile: ProfileSyncPayload {
                thresholds: vec![DEFAULT_THRESHOLD; sensor_count],
                sensor_labels: (1..=sensor_count).map(|i| format!("Sensor {i}")).collect(),
                sensor_colors: DEFAULT_SENSOR_COLORS.iter().map(ToString::to_string).collect(),
                threshold_color: "#4dd253".to_string(),
                use_threshold_color: true,
                use_single_color: true,
                single_bar_color: DEFAULT_SENSOR_COLORS[0].to_string(),
                is_locked: false,
                theme: Theme::Dark,
            },
        }
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.profile.thresholds
    }

    pub fn sensor_count(&self) -> usize {
        self.profile.thresholds.len()
    }

    #[cfg(test)]
    fn payload(&self) -> &ProfileSyncPayload {
        &self.profile
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.profile.is_locked = locked;
    }

    /// The `sync` message describing this profile.
    pub fn sync_message(&self) -> ApplicationMessage {
        ApplicationMessage::Sync {
            payload: self.profile.clone(),
        }
    }

    /// Serial commands that push every threshold to the pad.
    pub fn serial_commands(&self) -> Vec<String> {
        self.profile
            .thresholds
            .iter()
            .enumerate()
            .map(|(i, v)| serial_command(i, *v))
            .collect()
    }

    /// React to a message from the remote.
    pub fn handle(&mut self, message: &ApplicationMessage) -> Option<HostAction> {
        match message {
            ApplicationMessage::Ready => {
                debug!("remote ready, resyncing");
                Some(HostAction::Resync)
            }
            ApplicationMessage::Threshold { index, value } => {
                let i = usize::try_from(*index).ok()?;
                let Some(slot) = self.profile.thresholds.get_mut(i) else {
                    debug!(index, "ignoring threshold edit for unknown sensor");
                    return None;
                };
                *slot = *value;
                info!(index, value, "threshold changed by remote");
                Some(HostAction::ThresholdChanged {
                    serial_command: serial_command(i, *value),
                })
            }
            _ => None,
        }
    }
}

fn serial_command(index: usize, value: u32) -> String {
    format!("{index} {value}\n")
}

/// A `values` message stamped with the current wall-clock time.
pub fn values_message(values: Vec<u32>) -> ApplicationMessage {
    ApplicationMessage::Values {
        payload: SensorReading {
            values,
            timestamp: now_ms(),
        },
    }
}

/// Admits at most one event per interval.
#[derive(Debug, Clone)]
pub struct ValueThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl Default for ValueThrottle {
    fn default() -> Self {
        Self::per_second(DEFAULT_VALUES_RATE_HZ)
    }
}

impl ValueThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn per_second(rate_hz: u32) -> Self {
        Self::new(Duration::from_millis(1000 / u64::from(rate_hz.max(1))))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether an event at `now` may go out. Admitting restarts the interval.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
