//! A display sink that records every write.
//!
//! Writes can be made to fail from a given area index onward, which is
//! how a display that drops off the bus mid-frame is modelled.

use crate::error::SinkError;
use crate::journal::{Journal, JournalEntry};
use crate::sink::{AreaWrite, DisplaySink, SinkConfig, SinkConnector};

/// One recorded area write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaRecord {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    /// Pixel bytes handed to the sink.
    pub pixels: Vec<u8>,
    /// Whether the write was reported as successful.
    pub ok: bool,
}

impl AreaRecord {
    pub fn rows(&self) -> u32 {
        self.bottom - self.top + 1
    }
}

/// Records whole-frame and area writes in order.
#[derive(Debug)]
pub struct RecordingSink {
    config: SinkConfig,
    journal: Option<Journal>,
    images: Vec<Vec<u8>>,
    areas: Vec<AreaRecord>,
    fail_areas_from: Option<usize>,
    close_calls: u32,
    closed: bool,
}

impl RecordingSink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            journal: None,
            images: Vec::new(),
            areas: Vec::new(),
            fail_areas_from: None,
            close_calls: 0,
            closed: false,
        }
    }

    /// Record writes into `journal` as well.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fail every area write whose index (counted from the first area
    /// write of the session) is `n` or greater.
    pub fn fail_areas_from(mut self, n: usize) -> Self {
        self.fail_areas_from = Some(n);
        self
    }

    /// Change the failure point on an open sink.
    pub fn set_fail_areas_from(&mut self, n: Option<usize>) {
        self.fail_areas_from = n;
    }

    /// Whole frames written, oldest first.
    pub fn images(&self) -> &[Vec<u8>] {
        &self.images
    }

    /// Area writes, oldest first.
    pub fn areas(&self) -> &[AreaRecord] {
        &self.areas
    }

    /// Forget recorded writes; failure settings are kept.
    pub fn clear(&mut self) {
        self.images.clear();
        self.areas.clear();
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(entry);
        }
    }
}

impl DisplaySink for RecordingSink {
    fn read_config(&mut self) -> Result<SinkConfig, SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        Ok(self.config.clone())
    }

    fn write_area(&mut self, area: &AreaWrite<'_>) -> Result<(), SinkError> {
        let index = self.areas.len();
        let ok = !self.closed && self.fail_areas_from.is_none_or(|n| index < n);
        self.areas.push(AreaRecord {
            left: area.left,
            top: area.top,
            right: area.right,
            bottom: area.bottom,
            pixels: area.pixels.to_vec(),
            ok,
        });
        self.record(JournalEntry::AreaWritten {
            top: area.top,
            bottom: area.bottom,
            ok,
        });
        if ok {
            Ok(())
        } else {
            Err(SinkError::Disconnected)
        }
    }

    fn write_image(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        self.images.push(frame.to_vec());
        self.record(JournalEntry::ImageWritten {
            all_zero: frame.iter().all(|&b| b == 0),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
        if !self.closed {
            self.closed = true;
            self.record(JournalEntry::SinkClosed);
        }
    }
}

// ── RecordingConnector ───────────────────────────────────────────

/// Hands out a prepared [`RecordingSink`], optionally after a number of
/// failed attempts.
#[derive(Debug)]
pub struct RecordingConnector {
    sink: Option<RecordingSink>,
    failures_left: Option<u32>,
    attempts: u32,
}

impl RecordingConnector {
    pub fn new(sink: RecordingSink) -> Self {
        Self {
            sink: Some(sink),
            failures_left: Some(0),
            attempts: 0,
        }
    }

    /// Report no device for the first `n` attempts.
    pub fn fail_first(mut self, n: u32) -> Self {
        self.failures_left = Some(n);
        self
    }

    /// A connector whose device never appears.
    pub fn unreachable() -> Self {
        Self {
            sink: None,
            failures_left: None,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl SinkConnector for RecordingConnector {
    type Sink = RecordingSink;

    fn open(&mut self) -> Result<RecordingSink, SinkError> {
        self.attempts += 1;
        match &mut self.failures_left {
            None => return Err(SinkError::NotFound),
            Some(0) => {}
            Some(n) => {
                *n -= 1;
                return Err(SinkError::NotFound);
            }
        }
        self.sink.take().ok_or(SinkError::Busy)
    }
}
