//! Ordered event log shared by the in-process channel and sink backends.
//!
//! [`MemoryChannel`](crate::channel::MemoryChannel) and
//! [`RecordingSink`](crate::sink::RecordingSink) append to the same
//! [`Journal`], so a test can assert how lock operations interleave with
//! display writes.

use std::sync::{Arc, Mutex, MutexGuard};

/// One observable step of a relay cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// The exclusion token was acquired.
    LockAcquired,
    /// The exclusion token was released.
    LockReleased,
    /// The capture resolution was written into shared state.
    ResolutionRequested { width: u32, height: u32 },
    /// A whole canvas was pushed to the display.
    ImageWritten { all_zero: bool },
    /// A rectangular area was written to the display.
    AreaWritten { top: u32, bottom: u32, ok: bool },
    /// The frame channel was closed.
    ChannelClosed,
    /// The display session was closed.
    SinkClosed,
}

/// A cloneable handle to a shared, append-only list of [`JournalEntry`].
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: JournalEntry) {
        self.lock().push(entry);
    }

    /// Copy of every entry recorded so far.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().clone()
    }

    /// Drop every recorded entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries matching `pred`.
    pub fn count(&self, pred: impl Fn(&JournalEntry) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JournalEntry>> {
        // A poisoned journal still holds a valid Vec.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}
