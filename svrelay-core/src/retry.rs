//! Fixed-interval retry with an abort check before every attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

/// Why a retried operation gave up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32, last: E },

    /// The running flag was cleared between attempts.
    #[error("aborted after {attempts} attempts")]
    Aborted { attempts: u32 },
}

/// Attempt an operation, then retry every `interval` until it succeeds,
/// the `window` is used up, or the running flag is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries until aborted.
    pub window: Option<Duration>,
}

impl RetryPolicy {
    /// Retry for at most `window` after the first attempt.
    pub fn bounded(interval: Duration, window: Duration) -> Self {
        Self {
            interval,
            window: Some(window),
        }
    }

    /// Retry until aborted.
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            window: None,
        }
    }

    /// Retries allowed after the first attempt, or `None` if unbounded.
    pub fn max_retries(&self) -> Option<u32> {
        self.window.map(|w| {
            if self.interval.is_zero() {
                0
            } else {
                u32::try_from(w.as_nanos() / self.interval.as_nanos()).unwrap_or(u32::MAX)
            }
        })
    }

    /// Run `op` under this policy. `op` receives the 1-based attempt
    /// number.
    pub fn run<T, E>(
        &self,
        running: &AtomicBool,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, RetryError<E>> {
        let max_attempts = self.max_retries().map(|r| r.saturating_add(1));
        let mut attempts = 0u32;

        loop {
            if !running.load(Ordering::SeqCst) {
                return Err(RetryError::Aborted { attempts });
            }
            attempts += 1;
            match op(attempts) {
                Ok(value) => return Ok(value),
                Err(last) => {
                    if max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(RetryError::Exhausted { attempts, last });
                    }
                }
            }
            std::thread::sleep(self.interval);
        }
    }
}
