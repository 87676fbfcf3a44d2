//! Live Trip Tracking
//!
//! Keeps at most one server-push telemetry subscription open for the entity
//! currently on screen, reconnecting with a bounded linear backoff and
//! publishing the latest valid position to the presentation layer.

pub mod core;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod transport;
pub mod api;

// Re-export commonly used types
pub use crate::core::{ConnectionState, Generation, Position, RetryBudget, SubscriptionKey};
pub use processing::{ParseError, PositionParser, SseDecoder, SseEvent};
pub use validation::{PositionValidator, ValidationError};
pub use transport::{
    EventStreamSource, HttpEventSource, RetryScheduler, TelemetryTransport, TransportError,
    TransportResult,
};
pub use utils::{ConfigError, ConfigResult, LogLevel, TrackingConfig};
pub use api::{
    spawn_tracker, ActivationGate, ConnectionControl, ConnectionEvent, StatusIndicator,
    StreamConnection, TrackingHandle, TrackingSnapshot,
};
