//! A display sink with no device behind it.
//!
//! Accepts every well-formed write and keeps counters. Used when the
//! relay runs without a device transport linked in, and to measure the
//! pipeline on its own.

use tracing::trace;

use crate::error::SinkError;
use crate::sink::{AreaWrite, DisplaySink, SinkConfig, SinkConnector};

/// Counting sink with a fixed configuration.
#[derive(Debug)]
pub struct HeadlessSink {
    config: SinkConfig,
    areas: u64,
    images: u64,
    bytes: u64,
    closed: bool,
}

impl HeadlessSink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            areas: 0,
            images: 0,
            bytes: 0,
            closed: false,
        }
    }

    /// Area writes accepted so far.
    pub fn areas_written(&self) -> u64 {
        self.areas
    }

    /// Whole-frame writes accepted so far.
    pub fn images_written(&self) -> u64 {
        self.images
    }

    /// Pixel bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DisplaySink for HeadlessSink {
    fn read_config(&mut self) -> Result<SinkConfig, SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        Ok(self.config.clone())
    }

    fn write_area(&mut self, area: &AreaWrite<'_>) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        if area.top > area.bottom || area.left > area.right || area.right >= self.config.width {
            return Err(SinkError::OutOfBounds(format!(
                "area ({},{})-({},{})",
                area.left, area.top, area.right, area.bottom
            )));
        }
        let expected = area.rows() as usize * area.columns() as usize * self.config.pixel_bytes();
        if area.pixels.len() < expected {
            return Err(SinkError::OutOfBounds(format!(
                "area needs {expected} bytes, got {}",
                area.pixels.len()
            )));
        }
        trace!("area rows {}..={}", area.top, area.bottom);
        self.areas += 1;
        self.bytes += expected as u64;
        Ok(())
    }

    fn write_image(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        self.images += 1;
        self.bytes += frame.len() as u64;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Opens a [`HeadlessSink`] with a preset configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConnector {
    config: SinkConfig,
}

impl HeadlessConnector {
    pub fn new(config: SinkConfig) -> Self {
        Self { config }
    }
}

impl SinkConnector for HeadlessConnector {
    type Sink = HeadlessSink;

    fn open(&mut self) -> Result<HeadlessSink, SinkError> {
        Ok(HeadlessSink::new(self.config.clone()))
    }
}
