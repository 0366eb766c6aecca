//! Domain-specific error types for the frame relay.
//!
//! Every fallible core operation returns `Result<T, RelayError>`.
//! Sink primitives report [`SinkError`], which converts into
//! [`RelayError`] when it has to leave the session.

use thiserror::Error;

/// The canonical error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Producer Errors ──────────────────────────────────────────
    /// The producer's shared frame region could not be attached.
    #[error("frame channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// A named event or semaphore reported a failure.
    #[error("synchronization primitive failed: {0}")]
    Sync(String),

    // ── Sink Errors ──────────────────────────────────────────────
    /// The sink could not be opened inside the startup window.
    #[error("display unreachable after {attempts} attempts: {last}")]
    SinkUnreachable { attempts: u32, last: SinkError },

    /// The sink reported a configuration the relay cannot drive.
    #[error("invalid display configuration: {0}")]
    InvalidSinkConfig(&'static str),

    /// A sink primitive failed outside the startup window.
    #[error("display error: {0}")]
    Sink(#[from] SinkError),

    // ── Resource Errors ──────────────────────────────────────────
    /// The fixed canvas could not be allocated.
    #[error("canvas allocation of {bytes} bytes failed")]
    CanvasAllocation { bytes: usize },

    /// The local abort flag was raised before the operation completed.
    #[error("aborted")]
    Aborted,

    /// An I/O error from the operating system.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── SinkError ─────────────────────────────────────────────────────

/// Typed error for display sink primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// No device answered the open request.
    #[error("no display device found")]
    NotFound,

    /// The device is held by another client.
    #[error("display device busy")]
    Busy,

    /// The device stopped accepting writes.
    #[error("display disconnected")]
    Disconnected,

    /// A write addressed rows or bytes outside the frame buffer.
    #[error("write out of bounds: {0}")]
    OutOfBounds(String),

    /// Transport-specific failure with a human-readable message.
    #[error("transport failure: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = RelayError::SinkUnreachable {
            attempts: 26,
            last: SinkError::NotFound,
        };
        assert!(e.to_string().contains("26"));
        assert!(e.to_string().contains("no display"));

        let e = RelayError::CanvasAllocation { bytes: 819_840 };
        assert!(e.to_string().contains("819840"));
    }

    #[test]
    fn from_sink_error() {
        let e: RelayError = SinkError::Disconnected.into();
        assert!(matches!(e, RelayError::Sink(SinkError::Disconnected)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no mapping");
        let e: RelayError = io_err.into();
        assert!(matches!(e, RelayError::Io(_)));
    }
}
