//! In-process frame channel.
//!
//! [`MemoryChannel`] keeps the producer's region in a `Vec<u8>` laid out
//! exactly like the shared mapping ([`SharedHeader`] followed by the
//! payload window). Frames queued with [`push_frame`](MemoryChannel::push_frame)
//! are written into the region one per [`wait_for_frame`](FrameChannel::wait_for_frame)
//! call, mimicking a producer that writes and then raises its signal.

use std::collections::VecDeque;
use std::time::Duration;

use crate::channel::layout::{HEADER_SIZE, RHEIGHT_OFFSET, RWIDTH_OFFSET, SharedHeader};
use crate::channel::{ChannelOpener, FrameChannel, ProducerHeader, WaitStatus};
use crate::error::RelayError;
use crate::journal::{Journal, JournalEntry};

// ── MemoryChannel ────────────────────────────────────────────────

/// A frame channel backed by process memory.
pub struct MemoryChannel {
    region: Vec<u8>,
    pending: VecDeque<(ProducerHeader, Vec<u8>)>,
    producer_holds_lock: bool,
    held: bool,
    closed: bool,
    journal: Option<Journal>,
}

impl MemoryChannel {
    /// Create a channel whose payload window holds `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            region: vec![0u8; HEADER_SIZE + capacity],
            pending: VecDeque::new(),
            producer_holds_lock: false,
            held: false,
            closed: false,
            journal: None,
        }
    }

    /// Record lock and clear operations into `journal`.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Queue a frame. The header is written verbatim, so `payload_size`
    /// may disagree with `pixels.len()`; pixels beyond the window are
    /// dropped.
    pub fn push_frame(&mut self, header: ProducerHeader, pixels: &[u8]) {
        self.pending.push_back((header, pixels.to_vec()));
    }

    /// Frames queued but not yet delivered.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Simulate a producer that keeps the token busy.
    pub fn set_lock_held_by_producer(&mut self, held: bool) {
        self.producer_holds_lock = held;
    }

    /// The payload window as the producer sees it.
    pub fn payload(&self) -> &[u8] {
        &self.region[HEADER_SIZE..]
    }

    /// Resolution last written by [`FrameChannel::request_resolution`].
    pub fn requested_resolution(&self) -> (i32, i32) {
        let h = self.decoded();
        (h.rwidth, h.rheight)
    }

    /// Whether the relay currently holds the token.
    pub fn is_locked(&self) -> bool {
        self.held
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn decoded(&self) -> SharedHeader {
        SharedHeader::decode(&self.region).unwrap_or_default()
    }

    fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(entry);
        }
    }

    /// Write the next queued frame into the region, keeping the
    /// requested resolution fields the relay owns.
    fn produce(&mut self, header: ProducerHeader, pixels: &[u8]) {
        let current = self.decoded();
        let mut shared = SharedHeader::from(header);
        shared.rwidth = current.rwidth;
        shared.rheight = current.rheight;
        self.region[..HEADER_SIZE].copy_from_slice(&shared.encode());

        let window = &mut self.region[HEADER_SIZE..];
        let n = pixels.len().min(window.len());
        window[..n].copy_from_slice(&pixels[..n]);
    }
}

impl FrameChannel for MemoryChannel {
    fn wait_for_frame(&mut self, _timeout: Duration) -> Result<WaitStatus, RelayError> {
        if self.closed {
            return Err(RelayError::Sync("channel closed".into()));
        }
        match self.pending.pop_front() {
            Some((header, pixels)) => {
                self.produce(header, &pixels);
                Ok(WaitStatus::Signaled)
            }
            None => Ok(WaitStatus::TimedOut),
        }
    }

    fn try_acquire(&mut self, _timeout: Duration) -> Result<bool, RelayError> {
        if self.closed {
            return Err(RelayError::Sync("channel closed".into()));
        }
        if self.producer_holds_lock || self.held {
            return Ok(false);
        }
        self.held = true;
        self.record(JournalEntry::LockAcquired);
        Ok(true)
    }

    fn release(&mut self) -> Result<(), RelayError> {
        if !self.held {
            return Err(RelayError::Sync("release without acquire".into()));
        }
        self.held = false;
        self.record(JournalEntry::LockReleased);
        Ok(())
    }

    fn header(&self) -> ProducerHeader {
        self.decoded().into()
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.region[HEADER_SIZE..]
    }

    fn request_resolution(&mut self, width: u32, height: u32) {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        self.region[RWIDTH_OFFSET..RWIDTH_OFFSET + 4].copy_from_slice(&w.to_ne_bytes());
        self.region[RHEIGHT_OFFSET..RHEIGHT_OFFSET + 4].copy_from_slice(&h.to_ne_bytes());
        self.record(JournalEntry::ResolutionRequested { width, height });
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.held = false;
        self.pending.clear();
        self.record(JournalEntry::ChannelClosed);
    }
}

// ── MemoryOpener ─────────────────────────────────────────────────

/// Hands out a prepared [`MemoryChannel`] after a number of failed
/// attempts, modelling a producer that starts late.
pub struct MemoryOpener {
    channel: Option<MemoryChannel>,
    failures_left: u32,
    attempts: u32,
}

impl MemoryOpener {
    pub fn new(channel: MemoryChannel) -> Self {
        Self {
            channel: Some(channel),
            failures_left: 0,
            attempts: 0,
        }
    }

    /// Report the producer as unavailable for the first `n` attempts.
    pub fn fail_first(mut self, n: u32) -> Self {
        self.failures_left = n;
        self
    }

    /// Number of `open` calls made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl ChannelOpener for MemoryOpener {
    type Channel = MemoryChannel;

    fn open(&mut self) -> Result<MemoryChannel, RelayError> {
        self.attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(RelayError::ChannelUnavailable("producer not running".into()));
        }
        self.channel
            .take()
            .ok_or_else(|| RelayError::ChannelUnavailable("channel already handed out".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header(fsize: u32) -> ProducerHeader {
        ProducerHeader {
            width: 2,
            height: 2,
            bpp: 16,
            frame_count: 4,
            stride_size: 4,
            payload_size: fsize,
            view_size: 8,
            ..Default::default()
        }
    }

    #[test]
    fn frames_delivered_one_per_wait() {
        let mut ch = MemoryChannel::new(8);
        ch.push_frame(header(8), &[1u8; 8]);
        ch.push_frame(header(8), &[2u8; 8]);

        assert_eq!(ch.wait_for_frame(Duration::ZERO).unwrap(), WaitStatus::Signaled);
        assert_eq!(ch.payload(), &[1u8; 8]);
        assert_eq!(ch.pending_frames(), 1);

        assert_eq!(ch.wait_for_frame(Duration::ZERO).unwrap(), WaitStatus::Signaled);
        assert_eq!(ch.payload(), &[2u8; 8]);

        assert_eq!(ch.wait_for_frame(Duration::ZERO).unwrap(), WaitStatus::TimedOut);
    }

    #[test]
    fn oversized_pixels_truncated_to_window() {
        let mut ch = MemoryChannel::new(8);
        ch.push_frame(header(1000), &[9u8; 32]);
        ch.wait_for_frame(Duration::ZERO).unwrap();
        assert_eq!(ch.payload().len(), 8);
        assert_eq!(ch.header().payload_size, 1000);
    }

    #[test]
    fn requested_resolution_survives_new_frames() {
        let mut ch = MemoryChannel::new(8);
        ch.request_resolution(854, 480);
        ch.push_frame(header(8), &[0u8; 8]);
        ch.wait_for_frame(Duration::ZERO).unwrap();
        assert_eq!(ch.requested_resolution(), (854, 480));
        assert_eq!(ch.header().requested_width, 854);
    }

    #[test]
    fn close_is_idempotent() {
        let journal = Journal::new();
        let mut ch = MemoryChannel::new(8).with_journal(journal.clone());
        ch.close();
        ch.close();
        assert!(ch.is_closed());
        assert_eq!(journal.count(|e| *e == JournalEntry::ChannelClosed), 1);
        assert!(ch.wait_for_frame(Duration::ZERO).is_err());
    }

    #[test]
    fn opener_fails_then_succeeds() {
        let mut opener = MemoryOpener::new(MemoryChannel::new(8)).fail_first(2);
        assert!(opener.open().is_err());
        assert!(opener.open().is_err());
        assert!(opener.open().is_ok());
        assert_eq!(opener.attempts(), 3);
    }
}
