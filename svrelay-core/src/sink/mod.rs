//! Display sink session.
//!
//! The display sits behind a constrained byte transport that can only
//! address a limited number of rows per write. The relay consumes it
//! through [`DisplaySink`]; device discovery and wire framing belong to
//! the implementor.
//!
//! | Module      | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `headless`  | Sink that accepts and counts writes (no device)   |
//! | `recording` | Sink that records every write for inspection      |

pub mod headless;
pub mod recording;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RelayError, SinkError};

pub use headless::{HeadlessConnector, HeadlessSink};
pub use recording::{AreaRecord, RecordingConnector, RecordingSink};

/// Pixel size assumed when the reported pitch does not divide evenly
/// (RGB565).
pub const DEFAULT_PIXEL_BYTES: usize = 2;

// ── SinkConfig ───────────────────────────────────────────────────

/// Configuration reported by the display after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Native width in pixels.
    pub width: u32,
    /// Native height in pixels.
    pub height: u32,
    /// Bytes per row on the transport.
    pub row_pitch: u32,
    /// Largest pixel value the display accepts. Passed through as-is.
    pub pixel_clamp: u32,
    /// Maximum rows per area write.
    pub strip_height: u32,
    /// Human-readable device description.
    pub label: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            width: 854,
            height: 480,
            row_pitch: 854 * DEFAULT_PIXEL_BYTES as u32,
            pixel_clamp: 0xFFFF,
            strip_height: 40,
            label: "headless display".into(),
        }
    }
}

impl SinkConfig {
    /// Bytes per pixel derived from the row pitch.
    pub fn pixel_bytes(&self) -> usize {
        if self.width != 0 && self.row_pitch != 0 && self.row_pitch % self.width == 0 {
            (self.row_pitch / self.width) as usize
        } else {
            DEFAULT_PIXEL_BYTES
        }
    }

    /// Check the configuration can drive a relay session.
    ///
    /// A zero width, height or strip height is rejected. A strip taller
    /// than the display is kept as reported; no full strip fits, so the
    /// first transfer fails and the session ends as a lost display.
    pub fn validated(self) -> Result<Self, RelayError> {
        if self.width == 0 || self.height == 0 {
            return Err(RelayError::InvalidSinkConfig("display reports zero width or height"));
        }
        if self.strip_height == 0 {
            return Err(RelayError::InvalidSinkConfig("display reports zero strip height"));
        }
        if self.strip_height > self.height {
            warn!(
                "strip height {} exceeds display height {}; no full strip fits",
                self.strip_height, self.height
            );
        }
        Ok(self)
    }
}

// ── AreaWrite ────────────────────────────────────────────────────

/// One rectangular write. Coordinates are inclusive, as the transport
/// addresses them.
#[derive(Debug, Clone, Copy)]
pub struct AreaWrite<'a> {
    /// Pixel rows to send, starting at the source row offset.
    pub pixels: &'a [u8],
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl AreaWrite<'_> {
    /// Rows covered by the write.
    pub fn rows(&self) -> u32 {
        self.bottom.saturating_sub(self.top) + 1
    }

    /// Columns covered by the write.
    pub fn columns(&self) -> u32 {
        self.right.saturating_sub(self.left) + 1
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// An open display session.
pub trait DisplaySink {
    /// Read the display's configuration.
    fn read_config(&mut self) -> Result<SinkConfig, SinkError>;

    /// Write a rectangular area.
    fn write_area(&mut self, area: &AreaWrite<'_>) -> Result<(), SinkError>;

    /// Write a whole display-sized frame.
    fn write_image(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// End the session. Safe to call repeatedly.
    fn close(&mut self);
}

/// Opens display sessions.
pub trait SinkConnector {
    type Sink: DisplaySink;

    fn open(&mut self) -> Result<Self::Sink, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_bytes_from_pitch() {
        let mut c = SinkConfig::default();
        assert_eq!(c.pixel_bytes(), 2);
        c.row_pitch = 854 * 4;
        assert_eq!(c.pixel_bytes(), 4);
        c.row_pitch = 1001;
        assert_eq!(c.pixel_bytes(), DEFAULT_PIXEL_BYTES);
        c.row_pitch = 0;
        assert_eq!(c.pixel_bytes(), DEFAULT_PIXEL_BYTES);
    }

    #[test]
    fn validation_rejects_zero_geometry() {
        let c = SinkConfig {
            height: 0,
            ..Default::default()
        };
        assert!(matches!(c.validated(), Err(RelayError::InvalidSinkConfig(_))));

        let c = SinkConfig {
            strip_height: 0,
            ..Default::default()
        };
        assert!(matches!(c.validated(), Err(RelayError::InvalidSinkConfig(_))));
    }

    #[test]
    fn validation_keeps_tall_strips() {
        let c = SinkConfig {
            strip_height: 1000,
            ..Default::default()
        };
        assert_eq!(c.validated().unwrap().strip_height, 1000);
    }

    #[test]
    fn area_dimensions_inclusive() {
        let a = AreaWrite {
            pixels: &[],
            left: 0,
            top: 40,
            right: 853,
            bottom: 79,
        };
        assert_eq!(a.rows(), 40);
        assert_eq!(a.columns(), 854);
    }
}
