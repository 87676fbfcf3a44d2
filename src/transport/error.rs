//! Transport error types

use std::time::Duration;

/// Failures of the underlying telemetry stream.
///
/// Every variant is recovered by the connection's retry budget; none of them
/// escapes the connection boundary as an error value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Request could not be sent or the connection was refused
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Server answered with a non-success status
    #[error("HTTP error: {status} - {message}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase
        message: String,
    },

    /// Body stream ended
    #[error("stream closed: {reason}")]
    StreamClosed { reason: String },

    /// Body stream yielded an error mid-flight
    #[error("stream error: {0}")]
    StreamError(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Endpoint URL could not be built from configuration
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport refused to open synchronously
    #[error("open rejected: {0}")]
    OpenRejected(String),
}

impl TransportError {
    pub fn closed(reason: impl Into<String>) -> Self {
        TransportError::StreamClosed {
            reason: reason.into(),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
