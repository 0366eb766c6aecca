//! Configuration for the relay service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use svrelay_core::{ChannelNames, RelayOptions, SinkConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Producer kernel object names.
    pub channel: ChannelConfig,
    /// Waits and retry intervals.
    pub timing: TimingConfig,
    /// Display geometry for the headless sink.
    pub display: DisplayConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Names of the producer's shared region, update signal and token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub map_name: String,
    pub event_name: String,
    pub lock_name: String,
}

/// Relay timing, in milliseconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait on the producer's update signal.
    pub frame_wait_ms: u64,
    /// Wait for the exclusion token.
    pub lock_wait_ms: u64,
    /// Pause after an idle wait.
    pub idle_backoff_ms: u64,
    /// Interval between producer attach attempts.
    pub producer_retry_ms: u64,
    /// Interval between display open attempts.
    pub sink_retry_ms: u64,
    /// How long to keep trying the display at startup.
    pub sink_open_window_ms: u64,
    /// Statistics log interval in seconds.
    pub stats_interval_secs: u64,
}

/// Geometry reported by the headless display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Bytes per transport row.
    pub row_pitch: u32,
    pub pixel_clamp: u32,
    /// Maximum rows per area write.
    pub strip_height: u32,
    pub label: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ChannelConfig {
    fn default() -> Self {
        let names = ChannelNames::default();
        Self {
            map_name: names.map,
            event_name: names.event,
            lock_name: names.lock,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let opts = RelayOptions::default();
        Self {
            frame_wait_ms: millis(opts.frame_wait),
            lock_wait_ms: millis(opts.lock_wait),
            idle_backoff_ms: millis(opts.idle_backoff),
            producer_retry_ms: millis(opts.producer_retry),
            sink_retry_ms: millis(opts.sink_retry),
            sink_open_window_ms: millis(opts.sink_open_window),
            stats_interval_secs: opts.stats_interval.as_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let sink = SinkConfig::default();
        Self {
            width: sink.width,
            height: sink.height,
            row_pitch: sink.row_pitch,
            pixel_clamp: sink.pixel_clamp,
            strip_height: sink.strip_height,
            label: sink.label,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Loading ──────────────────────────────────────────────────────

/// Where [`RelayConfig::load`] got its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file.
    File,
    /// No readable file; defaults used.
    Missing,
    /// The file did not parse; defaults used.
    Invalid(String),
}

impl ConfigSource {
    pub fn log(&self, path: &Path) {
        match self {
            Self::File => tracing::info!("loaded config from {}", path.display()),
            Self::Missing => tracing::info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
            }
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Nothing is logged here since this runs before the subscriber is
    /// installed; call [`ConfigSource::log`] once it is.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(cfg) => (cfg, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Relay timing with zero waits raised to 1 ms.
    pub fn to_relay_options(&self) -> RelayOptions {
        let t = &self.timing;
        let at_least_1ms = |ms: u64| Duration::from_millis(ms.max(1));
        RelayOptions {
            frame_wait: at_least_1ms(t.frame_wait_ms),
            lock_wait: at_least_1ms(t.lock_wait_ms),
            idle_backoff: Duration::from_millis(t.idle_backoff_ms),
            producer_retry: at_least_1ms(t.producer_retry_ms),
            sink_retry: at_least_1ms(t.sink_retry_ms),
            sink_open_window: Duration::from_millis(t.sink_open_window_ms),
            stats_interval: Duration::from_secs(t.stats_interval_secs.max(1)),
        }
    }

    pub fn channel_names(&self) -> ChannelNames {
        ChannelNames {
            map: self.channel.map_name.clone(),
            event: self.channel.event_name.clone(),
            lock: self.channel.lock_name.clone(),
        }
    }

    /// Configuration the headless display reports. Validation happens
    /// when the session reads it back.
    pub fn sink_config(&self) -> SinkConfig {
        let d = &self.display;
        SinkConfig {
            width: d.width,
            height: d.height,
            row_pitch: d.row_pitch,
            pixel_clamp: d.pixel_clamp,
            strip_height: d.strip_height,
            label: d.label.clone(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
