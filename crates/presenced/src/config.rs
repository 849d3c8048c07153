use anyhow::{bail, Context, Result};
use presence_hw::Coordinates;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::wizard::WizardSettings;

const DEFAULT_CONFIG_PATH: &str = "/etc/presence/presenced.toml";

/// Daemon configuration: defaults, then an optional TOML file, then
/// `PRESENCE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the attendance backend.
    pub api_url: String,
    pub request_timeout_secs: u64,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// When false the daemon runs without a camera (degraded mode).
    pub camera_enabled: bool,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Fixed kiosk position. Both must be set for a location to exist.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Attendance feed refresh cadence.
    pub poll_interval_secs: u64,
    /// Number of most-recent records kept for display.
    pub feed_window: usize,
    /// Frames the enrollment wizard collects before training.
    pub capture_target: usize,
    pub capture_interval_ms: u64,
    pub training_tick_ms: u64,
    /// Progress added per training tick, in percent.
    pub training_step: u8,
    /// Active employee count for the stats fallback; 0 when unknown.
    pub roster_size: u32,
    /// Submit the employee to the backend once enrollment completes.
    pub register_on_complete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 10,
            camera_device: "/dev/video0".to_string(),
            camera_enabled: true,
            warmup_frames: 4,
            latitude: None,
            longitude: None,
            poll_interval_secs: 30,
            feed_window: 4,
            capture_target: 20,
            capture_interval_ms: 500,
            training_tick_ms: 200,
            training_step: 5,
            roster_size: 0,
            register_on_complete: true,
        }
    }
}

impl Config {
    /// Load from `PRESENCE_CONFIG` (or the default path, if it exists),
    /// then apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PRESENCE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `PRESENCE_*` overrides from `lookup`. Unparseable values are
    /// ignored and the current value kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PRESENCE_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = lookup("PRESENCE_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("PRESENCE_CAMERA_ENABLED") {
            self.camera_enabled = v != "0";
        }
        self.request_timeout_secs = parsed(
            &lookup,
            "PRESENCE_REQUEST_TIMEOUT_SECS",
            self.request_timeout_secs,
        );
        self.warmup_frames = parsed(&lookup, "PRESENCE_WARMUP_FRAMES", self.warmup_frames);
        self.latitude = lookup("PRESENCE_LATITUDE")
            .and_then(|v| v.parse().ok())
            .or(self.latitude);
        self.longitude = lookup("PRESENCE_LONGITUDE")
            .and_then(|v| v.parse().ok())
            .or(self.longitude);
        self.poll_interval_secs = parsed(
            &lookup,
            "PRESENCE_POLL_INTERVAL_SECS",
            self.poll_interval_secs,
        );
        self.feed_window = parsed(&lookup, "PRESENCE_FEED_WINDOW", self.feed_window);
        self.capture_target = parsed(&lookup, "PRESENCE_CAPTURE_TARGET", self.capture_target);
        self.capture_interval_ms = parsed(
            &lookup,
            "PRESENCE_CAPTURE_INTERVAL_MS",
            self.capture_interval_ms,
        );
        self.training_tick_ms = parsed(&lookup, "PRESENCE_TRAINING_TICK_MS", self.training_tick_ms);
        self.training_step = parsed(&lookup, "PRESENCE_TRAINING_STEP", self.training_step);
        self.roster_size = parsed(&lookup, "PRESENCE_ROSTER_SIZE", self.roster_size);
        if let Some(v) = lookup("PRESENCE_REGISTER_ON_COMPLETE") {
            self.register_on_complete = v != "0";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture_target == 0 {
            bail!("capture_target must be at least 1");
        }
        if self.feed_window == 0 {
            bail!("feed_window must be at least 1");
        }
        if self.poll_interval_secs == 0 || self.capture_interval_ms == 0 || self.training_tick_ms == 0
        {
            bail!("poll, capture and training cadences must be non-zero");
        }
        if !(1..=100).contains(&self.training_step) {
            bail!("training_step must be within 1..=100, got {}", self.training_step);
        }
        if let Some(coords) = self.location_pair() {
            Coordinates::new(coords.0, coords.1)?;
        }
        Ok(())
    }

    fn location_pair(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Configured kiosk position, if both coordinates are set and valid.
    pub fn location(&self) -> Option<Coordinates> {
        let (lat, lng) = self.location_pair()?;
        Coordinates::new(lat, lng).ok()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn wizard_settings(&self) -> WizardSettings {
        WizardSettings {
            capture_target: self.capture_target,
            capture_interval: Duration::from_millis(self.capture_interval_ms),
            training_tick: Duration::from_millis(self.training_tick_ms),
            training_step: self.training_step,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
