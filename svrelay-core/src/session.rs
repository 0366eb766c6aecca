//! Relay session lifecycle.
//!
//! ```text
//!  open display ──► read + validate config ──► allocate canvas
//!   (bounded retry)                                   │
//!                                                     ▼
//!  teardown ◄── run loop ◄── request resolution ◄── attach producer
//!                                                   (retry until abort)
//! ```
//!
//! The display is opened first so a missing device fails fast. The
//! producer may start at any time afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::canvas::Canvas;
use crate::channel::ChannelOpener;
use crate::error::RelayError;
use crate::relay::{Relay, RelayOptions, RunExit};
use crate::retry::{RetryError, RetryPolicy};
use crate::sink::{DisplaySink, SinkConfig, SinkConnector};

/// Drives one relay from startup to teardown.
pub struct RelaySession<K: SinkConnector, O: ChannelOpener> {
    connector: K,
    opener: O,
    options: RelayOptions,
    running: Arc<AtomicBool>,
}

impl<K: SinkConnector, O: ChannelOpener> RelaySession<K, O> {
    pub fn new(connector: K, opener: O, options: RelayOptions) -> Self {
        Self {
            connector,
            opener,
            options,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Use `running` as the stop flag, so a caller that already owns
    /// one can stop the session with it.
    pub fn with_stop_handle(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// A cloneable flag; storing `false` stops the session at its next
    /// check (retry loops and the main loop check once per iteration).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the session to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Run the whole session.
    ///
    /// Returns `Err` only for startup failures and broken sync
    /// primitives; a lost display or an abort is a normal exit.
    pub fn run(&mut self) -> Result<RunExit, RelayError> {
        let (mut sink, config) = self.open_sink()?;

        let canvas = match Canvas::new(config.width, config.height, config.pixel_bytes()) {
            Ok(c) => c,
            Err(e) => {
                sink.close();
                return Err(e);
            }
        };

        let channel = match self.attach_producer() {
            Ok(c) => c,
            Err(RelayError::Aborted) => {
                sink.close();
                info!("relay stopped: aborted before the frame server appeared");
                return Ok(RunExit::Aborted);
            }
            Err(e) => {
                sink.close();
                return Err(e);
            }
        };

        let mut relay = Relay::new(
            channel,
            sink,
            canvas,
            config.strip_height,
            self.options.clone(),
        );
        let result = relay.run(&self.running);
        let totals = relay.totals();
        relay.shutdown();

        match &result {
            Ok(exit) => info!("relay stopped: {exit} after {} frames", totals.frames),
            Err(e) => warn!("relay stopped on error after {} frames: {e}", totals.frames),
        }
        result
    }

    /// Open the display within the startup window and read its
    /// configuration.
    fn open_sink(&mut self) -> Result<(K::Sink, SinkConfig), RelayError> {
        let policy = RetryPolicy::bounded(self.options.sink_retry, self.options.sink_open_window);
        let connector = &mut self.connector;

        let mut sink = policy
            .run(&self.running, |attempt| {
                connector.open().inspect_err(|e| {
                    debug!("display open attempt {attempt} failed: {e}");
                })
            })
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last } => {
                    RelayError::SinkUnreachable { attempts, last }
                }
                RetryError::Aborted { .. } => RelayError::Aborted,
            })?;

        let config = match sink
            .read_config()
            .map_err(RelayError::from)
            .and_then(SinkConfig::validated)
        {
            Ok(c) => c,
            Err(e) => {
                sink.close();
                return Err(e);
            }
        };

        info!(
            "found device: {} ({}x{}, {} rows per strip)",
            config.label, config.width, config.height, config.strip_height
        );
        Ok((sink, config))
    }

    /// Attach to the producer, retrying until it appears or the session
    /// is stopped.
    fn attach_producer(&mut self) -> Result<O::Channel, RelayError> {
        info!("waiting for frame server..");
        let policy = RetryPolicy::forever(self.options.producer_retry);
        let opener = &mut self.opener;

        let channel = policy
            .run(&self.running, |attempt| {
                opener.open().inspect_err(|e| {
                    if attempt == 1 {
                        debug!("frame server not available yet: {e}");
                    }
                })
            })
            .map_err(|e| match e {
                RetryError::Exhausted { last, .. } => last,
                RetryError::Aborted { .. } => RelayError::Aborted,
            })?;

        info!("connected to frame server");
        Ok(channel)
    }
}

// ── Tests ────────────────────────────────────────────────────────
