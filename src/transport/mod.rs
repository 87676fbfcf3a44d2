//! Transport abstraction for the telemetry push stream
//!
//! The stream connection never performs I/O itself. It drives a
//! [`TelemetryTransport`] and a [`RetryScheduler`]; the tokio runtime provides
//! implementations backed by an [`EventStreamSource`], tests use the mocks.

pub mod interface;
pub mod error;
pub mod http;
pub mod mock;

pub use interface::{EventStream, EventStreamSource, RetryScheduler, TelemetryTransport};
pub use error::{TransportError, TransportResult};
pub use http::HttpEventSource;
pub use mock::{MockScheduler, MockTransport};
