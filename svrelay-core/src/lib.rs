//! # svrelay-core
//!
//! Relays frames from a shared-memory video producer to a display that
//! is written in horizontal strips.
//!
//! ```text
//!  producer ──► [header | payload] ──► FrameAdapter ──► Canvas ──► strips ──► display
//!               shared mapping         (under lock)    (fixed)    (no lock)
//! ```
//!
//! This crate contains:
//! - **Channel**: `FrameChannel` over the producer's mapping, signal and
//!   exclusion token (`SharedMemoryChannel` on Windows, `MemoryChannel`
//!   in process)
//! - **Sink**: `DisplaySink` for strip-addressable displays
//!   (`HeadlessSink`, `RecordingSink`)
//! - **Adapter**: `FrameAdapter` reconciles changing frame geometry with
//!   the display canvas
//! - **Strip**: `transfer` streams the canvas out in fixed-height strips
//! - **Relay**: `Relay` runs the control loop, `RelaySession` the
//!   startup/teardown lifecycle
//! - **Error**: `RelayError` / `SinkError`, `thiserror`-based

pub mod adapter;
pub mod canvas;
pub mod channel;
pub mod error;
pub mod journal;
pub mod relay;
pub mod retry;
pub mod session;
pub mod sink;
pub mod strip;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use adapter::{Adaptation, CanvasReset, FrameAdapter};
pub use canvas::{Canvas, CopyReport};
pub use channel::{
    ChannelNames, ChannelOpener, FrameChannel, FrameGeometry, FrameLock, MemoryChannel,
    MemoryOpener, ProducerHeader, SharedMemoryChannel, WaitStatus,
};
pub use error::{RelayError, SinkError};
pub use journal::{Journal, JournalEntry};
pub use relay::{Relay, RelayOptions, RelayStats, RunExit, Step};
pub use retry::{RetryError, RetryPolicy};
pub use session::RelaySession;
pub use sink::{
    AreaRecord, AreaWrite, DisplaySink, HeadlessConnector, HeadlessSink, RecordingConnector,
    RecordingSink, SinkConfig, SinkConnector,
};
pub use strip::{StripPlan, TransferReport, TransferUnit, transfer};
