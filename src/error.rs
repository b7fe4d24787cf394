// Transport errors - shared error type for scheduling, automation and settings

use thiserror::Error;

/// Errors raised by the transport and its collaborators
///
/// Validation errors are raised before any state is touched, so a failed call
/// leaves the transport exactly as it was.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Time out of range: resolves to tick {0}, before the start of the timeline")]
    OutOfRangeTime(f64),

    #[error("Invalid time expression: {0}")]
    InvalidTime(String),

    #[error("Event callback failed: {0}")]
    Callback(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Shorthand for building an `InvalidArgument` error
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TransportError::InvalidArgument(message.into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Reject NaN and infinities with a descriptive message
pub(crate) fn ensure_finite(value: f64, what: &str) -> TransportResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TransportError::invalid(format!("{} must be finite, got {}", what, value)))
    }
}
