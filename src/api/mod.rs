//! Connection management API
//!
//! The synchronous state machine and activation gate, the tokio runtime that
//! drives them, and the presentation feed consumed by renderers.

pub mod connection;
pub mod gate;
pub mod nonblocking;
pub mod callback;
pub mod types;
pub mod formatting;

pub use types::{ConnectionEvent, TrackingSnapshot};
pub use connection::StreamConnection;
pub use gate::{ActivationGate, ConnectionControl, GateTransition};
pub use nonblocking::{spawn_tracker, TrackerError, TrackingHandle};
pub use callback::{CallbackHandle, EventCallback, FeedError, PositionCallback, SnapshotCallback, TrackingFeed};
pub use formatting::{display_position, JsonFormatter, SnapshotFormatter, StatusIndicator, TextFormatter};
