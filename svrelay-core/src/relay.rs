//! The relay control loop.
//!
//! One cycle:
//!
//! 1. Wait (bounded) for the producer's update signal; on timeout back
//!    off briefly and return.
//! 2. Take the exclusion token (bounded); on timeout skip the cycle.
//! 3. Read header + payload, let the [`FrameAdapter`] reconcile and copy.
//! 4. Release the token.
//! 5. Stream the canvas to the display in strips.
//!
//! The token never spans step 5, so the producer can prepare its next
//! frame while the previous one is still going out. A producer faster
//! than the display simply overwrites frames the relay never picked up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::adapter::{Adaptation, FrameAdapter};
use crate::canvas::Canvas;
use crate::channel::{FrameChannel, WaitStatus};
use crate::error::RelayError;
use crate::sink::DisplaySink;
use crate::strip::{self, TransferReport};

// ── RelayOptions ─────────────────────────────────────────────────

/// Timing knobs for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Bounded wait on the producer's update signal.
    pub frame_wait: Duration,
    /// Bounded wait for the exclusion token.
    pub lock_wait: Duration,
    /// Pause after a signal wait times out.
    pub idle_backoff: Duration,
    /// Interval between attempts to attach to the producer.
    pub producer_retry: Duration,
    /// Interval between attempts to open the display.
    pub sink_retry: Duration,
    /// How long to keep retrying the display after the first attempt.
    pub sink_open_window: Duration,
    /// How often to log relay statistics.
    pub stats_interval: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            frame_wait: Duration::from_millis(500),
            lock_wait: Duration::from_millis(1000),
            idle_backoff: Duration::from_millis(25),
            producer_retry: Duration::from_millis(500),
            sink_retry: Duration::from_millis(20),
            sink_open_window: Duration::from_millis(500),
            stats_interval: Duration::from_secs(5),
        }
    }
}

// ── Step / RunExit ───────────────────────────────────────────────

/// Outcome of a single relay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No frame signalled within the wait.
    Idle,
    /// A frame was signalled but the token stayed with the producer.
    LockTimeout,
    /// A frame was copied and streamed.
    Delivered {
        adaptation: Adaptation,
        transfer: TransferReport,
    },
    /// The display accepted none of the full strips.
    SinkLost(TransferReport),
}

/// Why [`Relay::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The running flag was cleared.
    Aborted,
    /// The display stopped accepting writes.
    SinkLost,
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aborted => write!(f, "aborted"),
            Self::SinkLost => write!(f, "display lost"),
        }
    }
}

// ── RelayStats ───────────────────────────────────────────────────

/// Counters since the last report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub frames: u64,
    pub idle: u64,
    pub lock_timeouts: u64,
    pub resets: u64,
    pub truncated_copies: u64,
}

impl RelayStats {
    fn record(&mut self, step: &Step) {
        match step {
            Step::Idle => self.idle += 1,
            Step::LockTimeout => self.lock_timeouts += 1,
            Step::Delivered { adaptation, .. } => {
                self.frames += 1;
                if adaptation.reset.is_some() {
                    self.resets += 1;
                }
                if adaptation.copy.is_some_and(|c| c.truncated()) {
                    self.truncated_copies += 1;
                }
            }
            Step::SinkLost(_) => {}
        }
    }
}

impl std::fmt::Display for RelayStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} idle waits, {} lock timeouts, {} resets, {} truncated copies",
            self.frames, self.idle, self.lock_timeouts, self.resets, self.truncated_copies
        )
    }
}

// ── Relay ────────────────────────────────────────────────────────

/// A connected producer channel, display and canvas.
pub struct Relay<C: FrameChannel, S: DisplaySink> {
    channel: C,
    sink: S,
    adapter: FrameAdapter,
    strip_height: u32,
    options: RelayOptions,
    stats: RelayStats,
    total: RelayStats,
}

impl<C: FrameChannel, S: DisplaySink> Relay<C, S> {
    /// Assemble a relay and ask the producer for the canvas resolution.
    pub fn new(
        mut channel: C,
        sink: S,
        canvas: Canvas,
        strip_height: u32,
        options: RelayOptions,
    ) -> Self {
        // Producer picks this up the next time it restarts capture.
        channel.request_resolution(canvas.width(), canvas.height());
        info!(
            "requested capture resolution {}x{}",
            canvas.width(),
            canvas.height()
        );

        Self {
            channel,
            sink,
            adapter: FrameAdapter::new(canvas),
            strip_height,
            options,
            stats: RelayStats::default(),
            total: RelayStats::default(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn adapter(&self) -> &FrameAdapter {
        &self.adapter
    }

    /// Counters over the whole run.
    pub fn totals(&self) -> RelayStats {
        self.total
    }

    /// Run one cycle.
    pub fn step(&mut self) -> Result<Step, RelayError> {
        let step = self.cycle()?;
        self.stats.record(&step);
        self.total.record(&step);
        Ok(step)
    }

    fn cycle(&mut self) -> Result<Step, RelayError> {
        if self.channel.wait_for_frame(self.options.frame_wait)? == WaitStatus::TimedOut {
            if !self.options.idle_backoff.is_zero() {
                std::thread::sleep(self.options.idle_backoff);
            }
            return Ok(Step::Idle);
        }

        let adaptation = {
            let Some(mut lock) = self.channel.lock(self.options.lock_wait)? else {
                debug!(
                    "frame lock not acquired within {:?}; skipping cycle",
                    self.options.lock_wait
                );
                return Ok(Step::LockTimeout);
            };
            let (header, payload) = lock.read();
            let adaptation = self.adapter.reconcile(&header, payload, &mut self.sink);
            lock.release()?;
            adaptation
        };

        let transfer = strip::transfer(
            &mut self.sink,
            self.adapter.canvas(),
            self.adapter.vertical_offset(),
            self.strip_height,
        );
        if !transfer.is_success() {
            return Ok(Step::SinkLost(transfer));
        }
        Ok(Step::Delivered {
            adaptation,
            transfer,
        })
    }

    /// Cycle until `running` is cleared or the display is lost.
    pub fn run(&mut self, running: &AtomicBool) -> Result<RunExit, RelayError> {
        let mut last_report = Instant::now();

        while running.load(Ordering::SeqCst) {
            if let Step::SinkLost(report) = self.step()? {
                error!(
                    "display rejected all {} strips; stopping",
                    report.full_issued
                );
                return Ok(RunExit::SinkLost);
            }

            if last_report.elapsed() >= self.options.stats_interval {
                let s = std::mem::take(&mut self.stats);
                info!("{s}");
                last_report = Instant::now();
            }
        }

        Ok(RunExit::Aborted)
    }

    /// Tear down: canvas first, then the channel and its handles, then
    /// the display session.
    pub fn shutdown(self) {
        let Self {
            mut channel,
            mut sink,
            adapter,
            ..
        } = self;
        drop(adapter);
        channel.close();
        sink.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
