//! Remote-side mirror of the host's profile and live values.

use std::time::{SystemTime, UNIX_EPOCH};

use webfsr_types::{ApplicationMessage, ProfileSyncPayload, Theme};

/// Bar count shown before the host has told us anything.
pub const DEFAULT_SENSOR_COUNT: usize = 6;

/// Colour used when nothing better is known.
pub const FALLBACK_COLOR: &str = "#ff0000";

/// What a remote knows about the host it is paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMirror {
    pub sensor_values: Vec<u32>,
    pub thresholds: Vec<u32>,
    pub sensor_labels: Vec<String>,
    pub sensor_colors: Vec<String>,
    pub threshold_color: String,
    pub use_threshold_color: bool,
    pub use_single_color: bool,
    pub single_bar_color: String,
    pub is_locked: bool,
    pub theme: Theme,
    /// When the last `sync` landed, in ms since the Unix epoch. 0 = never.
    pub last_sync_ms: u64,
}

impl Default for RemoteMirror {
    fn default() -> Self {
        Self {
            sensor_values: Vec::new(),
            thresholds: Vec::new(),
            sensor_labels: Vec::new(),
            sensor_colors: Vec::new(),
            threshold_color: FALLBACK_COLOR.to_string(),
            use_threshold_color: false,
            use_single_color: false,
            single_bar_color: FALLBACK_COLOR.to_string(),
            is_locked: false,
            theme: Theme::Dark,
            last_sync_ms: 0,
        }
    }
}

impl RemoteMirror {
    /// Fold a message from the host into the mirror.
    pub fn apply(&mut self, message: &ApplicationMessage) {
        self.apply_at(message, now_ms());
    }

    /// [`apply`](Self::apply) with an explicit clock.
    pub fn apply_at(&mut self, message: &ApplicationMessage, now_ms: u64) {
        match message {
            ApplicationMessage::Sync { payload } => self.sync(payload, now_ms),
            ApplicationMessage::Values { payload } => {
                self.sensor_values.clone_from(&payload.values);
            }
            _ => {}
        }
    }

    fn sync(&mut self, payload: &ProfileSyncPayload, now_ms: u64) {
        self.thresholds.clone_from(&payload.thresholds);
        self.sensor_labels.clone_from(&payload.sensor_labels);
        self.sensor_colors.clone_from(&payload.sensor_colors);
        self.threshold_color.clone_from(&payload.threshold_color);
        self.use_threshold_color = payload.use_threshold_color;
        self.use_single_color = payload.use_single_color;
        self.single_bar_color.clone_from(&payload.single_bar_color);
        self.is_locked = payload.is_locked;
        self.theme = payload.theme;
        self.last_sync_ms = now_ms;
    }

    /// Forget everything, e.g. after the host went away.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_synced(&self) -> bool {
        self.last_sync_ms != 0
    }

    pub fn sensor_count(&self) -> usize {
        if !self.thresholds.is_empty() {
            self.thresholds.len()
        } else if !self.sensor_values.is_empty() {
            self.sensor_values.len()
        } else {
            DEFAULT_SENSOR_COUNT
        }
    }

    /// Base colour of bar `index`.
    pub fn bar_color(&self, index: usize) -> &str {
        if self.use_single_color {
            return &self.single_bar_color;
        }
        if self.sensor_colors.is_empty() {
            return FALLBACK_COLOR;
        }
        let color = &self.sensor_colors[index % self.sensor_colors.len()];
        if color.is_empty() {
            FALLBACK_COLOR
        } else {
            color
        }
    }

    /// Colour bar `index` is drawn in right now, given its live value.
    pub fn active_color(&self, index: usize) -> &str {
        let over = match (self.sensor_values.get(index), self.thresholds.get(index)) {
            (Some(value), Some(threshold)) => value >= threshold,
            _ => false,
        };
        if self.use_threshold_color && over {
            &self.threshold_color
        } else {
            self.bar_color(index)
        }
    }

    pub fn label(&self, index: usize) -> String {
        self.sensor_labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Sensor {}", index + 1))
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
