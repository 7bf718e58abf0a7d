//! Error types for the Floodgate library.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// The retry attempt count exceeded the backoff curve's cap.
    ///
    /// Callers should treat this as "stop retrying", not as a transient
    /// failure.
    #[error("retry attempts exhausted: attempt {attempt} exceeds cap {max_attempts}")]
    AttemptsExhausted { attempt: u32, max_attempts: u32 },

    /// A valid attempt index resolved to an empty backoff curve slot.
    ///
    /// Unreachable for a correctly constructed curve; surfaced rather than
    /// recovered.
    #[error("backoff curve holds no value for attempt {attempt}")]
    CurveRange { attempt: u32 },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A shell command produced no output within the allotted time.
    #[error("command produced no output within {timeout:?}")]
    CommandTimeout { timeout: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
