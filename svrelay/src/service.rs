//! Relay service.
//!
//! The relay loop blocks on kernel waits and holds handles that must
//! stay on one thread, so the whole session is built and run inside a
//! single blocking task. The service owns the stop flag the session
//! checks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use svrelay_core::{
    ChannelOpener, HeadlessConnector, RelayError, RelaySession, RunExit, SinkConnector,
};

use crate::config::RelayConfig;

// ── RelayService ─────────────────────────────────────────────────

/// The top-level relay service.
pub struct RelayService {
    config: RelayConfig,
    running: Arc<AtomicBool>,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task or a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay from the configured shared-memory producer to the headless
    /// display until stopped or the display is lost.
    pub async fn run(&self) -> Result<RunExit, RelayError> {
        self.run_with(|config| {
            (
                HeadlessConnector::new(config.sink_config()),
                config.channel_names(),
            )
        })
        .await
    }

    /// Run a session whose display connector and producer opener are
    /// built by `build` on the blocking task.
    pub async fn run_with<K, O, F>(&self, build: F) -> Result<RunExit, RelayError>
    where
        K: SinkConnector + 'static,
        O: ChannelOpener + 'static,
        F: FnOnce(&RelayConfig) -> (K, O) + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let task = tokio::task::spawn_blocking(move || {
            let (connector, opener) = build(&config);
            RelaySession::new(connector, opener, config.to_relay_options())
                .with_stop_handle(running)
                .run()
        });

        let result = task.await.map_err(std::io::Error::from);
        self.running.store(false, Ordering::SeqCst);

        let exit = result??;
        info!("relay service stopped ({exit})");
        Ok(exit)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use svrelay_core::{
        MemoryChannel, MemoryOpener, ProducerHeader, RecordingConnector, RecordingSink,
        SinkError,
    };

    fn quick_config() -> RelayConfig {
        let mut cfg = RelayConfig::default();
        cfg.timing.frame_wait_ms = 1;
        cfg.timing.lock_wait_ms = 1;
        cfg.timing.idle_backoff_ms = 0;
        cfg.timing.producer_retry_ms = 1;
        cfg.timing.sink_retry_ms = 1;
        cfg.timing.sink_open_window_ms = 5;
        cfg
    }

    #[test]
    fn new_service_is_idle() {
        let svc = RelayService::new(RelayConfig::default());
        assert!(!svc.is_running());
        svc.stop_handle().store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn unreachable_display_fails_startup() {
        let svc = RelayService::new(quick_config());
        let err = svc
            .run_with(|_| {
                (
                    RecordingConnector::unreachable(),
                    MemoryOpener::new(MemoryChannel::new(16)),
                )
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::SinkUnreachable {
                last: SinkError::NotFound,
                ..
            }
        ));
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn stop_handle_ends_run() {
        let svc = RelayService::new(quick_config());
        let stop = svc.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop.store(false, Ordering::SeqCst);
        });

        let exit = svc
            .run_with(|config| {
                (
                    RecordingConnector::new(RecordingSink::new(config.sink_config())),
                    MemoryOpener::new(MemoryChannel::new(16)).fail_first(2),
                )
            })
            .await
            .unwrap();
        assert_eq!(exit, RunExit::Aborted);
    }

    #[tokio::test]
    async fn lost_display_ends_run() {
        let svc = RelayService::new(quick_config());
        let exit = svc
            .run_with(|config| {
                let sink_config = config.sink_config();
                let bytes = (sink_config.width * sink_config.height * 2) as usize;
                let mut channel = MemoryChannel::new(bytes);
                channel.push_frame(
                    ProducerHeader {
                        width: 640,
                        height: 360,
                        bpp: 16,
                        frame_count: 5,
                        stride_size: 1280,
                        payload_size: 640 * 360 * 2,
                        view_size: bytes as u32,
                        ..Default::default()
                    },
                    &[],
                );
                let sink = RecordingSink::new(sink_config).fail_areas_from(0);
                (RecordingConnector::new(sink), MemoryOpener::new(channel))
            })
            .await
            .unwrap();
        assert_eq!(exit, RunExit::SinkLost);
    }
}
