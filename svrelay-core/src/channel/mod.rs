//! Producer-side frame channel.
//!
//! A [`FrameChannel`] is the relay's view of the producer's shared frame
//! buffer: a header describing the latest frame, the raw pixel payload,
//! an update signal raised once per completed frame and a single-slot
//! exclusion token that also blocks the producer while held.
//!
//! | Module    | Purpose                                              |
//! |-----------|------------------------------------------------------|
//! | `layout`  | Byte layout of the shared header                     |
//! | `shm`     | Named file mapping + event + semaphore (Windows)     |
//! | `memory`  | In-process channel driven by a test or a demo feeder |

pub mod layout;
pub mod memory;
pub mod shm;

use std::time::Duration;

use tracing::warn;

use crate::error::RelayError;

pub use layout::{HEADER_SIZE, SharedHeader};
pub use memory::{MemoryChannel, MemoryOpener};
pub use shm::{ChannelNames, SharedMemoryChannel};

// ── ProducerHeader ───────────────────────────────────────────────

/// Snapshot of the producer's frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerHeader {
    /// Frame width in pixels.
    pub width: i32,
    /// Frame height in pixels.
    pub height: i32,
    /// Bits per pixel.
    pub bpp: i32,
    /// Frames written since the producer started capture.
    pub frame_count: u32,
    /// Row pitch in bytes.
    pub stride_size: u32,
    /// Bytes of pixel data in the current frame.
    pub payload_size: u32,
    /// Capacity of the producer's payload window in bytes.
    pub view_size: u32,
    /// Capture width last requested by a consumer.
    pub requested_width: i32,
    /// Capture height last requested by a consumer.
    pub requested_height: i32,
}

impl ProducerHeader {
    /// The producer has not completed its first frames yet.
    pub fn is_warming_up(&self) -> bool {
        self.frame_count < 2
    }

    /// Whether the frame carries pixel data worth copying.
    pub fn has_payload(&self) -> bool {
        self.stride_size != 0 && self.payload_size != 0
    }

    /// Geometry triple compared across cycles.
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.width,
            height: self.height,
            bpp: self.bpp,
        }
    }
}

/// Width, height and pixel depth of a producer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: i32,
    pub height: i32,
    pub bpp: i32,
}

// ── WaitStatus ───────────────────────────────────────────────────

/// Result of a bounded wait on the producer's update signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The producer finished writing a frame.
    Signaled,
    /// No frame arrived before the deadline.
    TimedOut,
}

// ── FrameChannel ─────────────────────────────────────────────────

/// Access to a producer's shared frame buffer.
///
/// `header` and `payload_mut` are only meaningful while the exclusion
/// token is held; go through [`FrameChannel::lock`] rather than calling
/// them directly.
pub trait FrameChannel {
    /// Block for at most `timeout` until the producer signals a frame.
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<WaitStatus, RelayError>;

    /// Try to take the exclusion token. `Ok(false)` means the deadline
    /// passed without the producer releasing it.
    fn try_acquire(&mut self, timeout: Duration) -> Result<bool, RelayError>;

    /// Hand the exclusion token back to the producer.
    fn release(&mut self) -> Result<(), RelayError>;

    /// Current header contents.
    fn header(&self) -> ProducerHeader;

    /// The producer's payload window.
    fn payload_mut(&mut self) -> &mut [u8];

    /// Ask the producer to capture at `width`×`height`. Takes effect
    /// whenever the producer next restarts capture.
    fn request_resolution(&mut self, width: u32, height: u32);

    /// Release the mapping and sync handles. Safe to call repeatedly.
    fn close(&mut self);

    /// Acquire the exclusion token, returning a guard that releases it
    /// on drop. `Ok(None)` when the token was not obtained in time.
    fn lock(&mut self, timeout: Duration) -> Result<Option<FrameLock<'_, Self>>, RelayError>
    where
        Self: Sized,
    {
        FrameLock::acquire(self, timeout)
    }
}

/// Attaches to a producer's frame channel.
///
/// Opening never creates the producer's region; a missing producer is
/// reported as [`RelayError::ChannelUnavailable`] and retried by the
/// caller.
pub trait ChannelOpener {
    type Channel: FrameChannel;

    fn open(&mut self) -> Result<Self::Channel, RelayError>;
}

// ── FrameLock ────────────────────────────────────────────────────

/// Scoped ownership of the channel's exclusion token.
///
/// While a `FrameLock` is alive the producer cannot write a new frame,
/// so it should live only long enough to copy the payload out.
pub struct FrameLock<'a, C: FrameChannel> {
    channel: &'a mut C,
    released: bool,
}

impl<'a, C: FrameChannel> FrameLock<'a, C> {
    /// Take the token within `timeout`.
    pub fn acquire(channel: &'a mut C, timeout: Duration) -> Result<Option<Self>, RelayError> {
        if channel.try_acquire(timeout)? {
            Ok(Some(Self {
                channel,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Header and payload from the same producer write cycle.
    pub fn read(&mut self) -> (ProducerHeader, &mut [u8]) {
        let header = self.channel.header();
        (header, self.channel.payload_mut())
    }

    /// Release the token now and report any failure.
    pub fn release(mut self) -> Result<(), RelayError> {
        self.released = true;
        self.channel.release()
    }
}

impl<C: FrameChannel> Drop for FrameLock<'_, C> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.channel.release() {
                warn!("failed to release frame lock: {e}");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Journal, JournalEntry};

    fn header(count: u32) -> ProducerHeader {
        ProducerHeader {
            width: 4,
            height: 2,
            bpp: 16,
            frame_count: count,
            stride_size: 8,
            payload_size: 16,
            view_size: 64,
            ..Default::default()
        }
    }

    #[test]
    fn warmup_and_payload_flags() {
        assert!(header(0).is_warming_up());
        assert!(header(1).is_warming_up());
        assert!(!header(2).is_warming_up());

        let mut h = header(5);
        assert!(h.has_payload());
        h.payload_size = 0;
        assert!(!h.has_payload());
        h.payload_size = 16;
        h.stride_size = 0;
        assert!(!h.has_payload());
    }

    #[test]
    fn lock_guard_releases_on_drop() {
        let journal = Journal::new();
        let mut ch = MemoryChannel::new(64).with_journal(journal.clone());
        ch.push_frame(header(3), &[7u8; 16]);
        ch.wait_for_frame(Duration::ZERO).unwrap();

        {
            let mut lock = ch.lock(Duration::ZERO).unwrap().expect("token");
            let (h, payload) = lock.read();
            assert_eq!(h.frame_count, 3);
            assert_eq!(&payload[..16], &[7u8; 16]);
        }

        assert_eq!(
            journal.entries(),
            vec![JournalEntry::LockAcquired, JournalEntry::LockReleased]
        );
    }

    #[test]
    fn explicit_release_does_not_double_release() {
        let journal = Journal::new();
        let mut ch = MemoryChannel::new(64).with_journal(journal.clone());
        ch.push_frame(header(3), &[]);
        ch.wait_for_frame(Duration::ZERO).unwrap();

        let lock = ch.lock(Duration::ZERO).unwrap().expect("token");
        lock.release().unwrap();

        assert_eq!(journal.count(|e| *e == JournalEntry::LockReleased), 1);
    }

    #[test]
    fn lock_timeout_yields_none() {
        let mut ch = MemoryChannel::new(64);
        ch.push_frame(header(3), &[]);
        ch.wait_for_frame(Duration::ZERO).unwrap();
        ch.set_lock_held_by_producer(true);

        assert!(ch.lock(Duration::ZERO).unwrap().is_none());
    }
}
