//! Transport and scheduler seams driven by the stream connection

use crate::core::{Generation, SubscriptionKey};
use crate::transport::TransportResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Owner of the single underlying push connection.
///
/// Implementations report back through the connection's `on_open`,
/// `on_message` and `on_failure` entry points, tagging every report with the
/// generation passed to [`TelemetryTransport::open`].
pub trait TelemetryTransport {
    /// Open a subscription for `key`. Any previous connection has already
    /// been closed by the caller.
    fn open(&mut self, key: &SubscriptionKey, generation: Generation) -> TransportResult<()>;

    /// Close the current connection, if any. Must be idempotent.
    fn close(&mut self);

    /// Whether a connection is currently open or opening
    fn is_open(&self) -> bool;
}

/// Owner of the single pending reconnect timer
pub trait RetryScheduler {
    /// Arrange for `on_retry_due(generation)` after `delay`, replacing any
    /// pending timer.
    fn schedule(&mut self, generation: Generation, delay: Duration);

    /// Cancel the pending timer, if any. Must be idempotent.
    fn cancel(&mut self);

    fn is_pending(&self) -> bool;
}

/// Raw body chunks of an opened event stream
pub type EventStream = Pin<Box<dyn Stream<Item = TransportResult<Bytes>> + Send>>;

/// Async source of per-key event streams, used by the tokio runtime
#[async_trait]
pub trait EventStreamSource: Send + Sync {
    /// Resolve once the server acknowledged the subscription
    async fn connect(&self, key: &SubscriptionKey) -> TransportResult<EventStream>;
}
