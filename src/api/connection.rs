//! Stream connection state machine
//!
//! [`StreamConnection`] owns the lifecycle of exactly one server-push
//! subscription. It performs no I/O: opening and closing go through a
//! [`TelemetryTransport`], the reconnect delay through a [`RetryScheduler`],
//! and their outcomes come back through the `on_*` entry points tagged with
//! the [`Generation`] they were issued under. Reports from any other
//! generation are stale and ignored.
//!
//! ```text
//! Idle ──activate──▶ Connecting ──open──▶ Connected
//!                        │                   │
//!                        └──── failure ──────┴──▶ Error ──retry due──▶ Connecting
//! any ──deactivate──▶ Disconnected
//! ```

use crate::api::callback::TrackingFeed;
use crate::api::types::{ConnectionEvent, TrackingSnapshot};
use crate::core::{ConnectionState, Generation, Position, RetryBudget, SubscriptionKey, BASE_RETRY_DELAY};
use crate::processing::PositionParser;
use crate::transport::{RetryScheduler, TelemetryTransport, TransportError};
use crate::utils::TrackingConfig;
use std::time::Duration;

/// Single-subscription telemetry connection with bounded linear backoff
pub struct StreamConnection<T: TelemetryTransport, S: RetryScheduler> {
    transport: T,
    scheduler: S,
    parser: PositionParser,
    state: ConnectionState,
    key: Option<SubscriptionKey>,
    generation: Generation,
    budget: RetryBudget,
    base_delay: Duration,
    consecutive_failures: u32,
    position: Option<Position>,
    last_error: Option<String>,
    feed: TrackingFeed,
}

impl<T: TelemetryTransport, S: RetryScheduler> StreamConnection<T, S> {
    /// Create a connection with the default 3 attempts / 3 s base delay
    pub fn new(transport: T, scheduler: S) -> Self {
        Self {
            transport,
            scheduler,
            parser: PositionParser::new(),
            state: ConnectionState::Idle,
            key: None,
            generation: Generation::default(),
            budget: RetryBudget::default(),
            base_delay: BASE_RETRY_DELAY,
            consecutive_failures: 0,
            position: None,
            last_error: None,
            feed: TrackingFeed::new(),
        }
    }

    /// Create a connection using the retry settings of `config`
    pub fn with_config(transport: T, scheduler: S, config: &TrackingConfig) -> Self {
        let mut connection = Self::new(transport, scheduler);
        connection.budget = config.retry_budget();
        connection.base_delay = config.base_retry_delay();
        connection
    }

    pub fn with_parser(mut self, parser: PositionParser) -> Self {
        self.parser = parser;
        self
    }

    /// Open (or keep) the subscription for `key`.
    ///
    /// An empty key is a programming error: it asserts in debug builds and is
    /// ignored in release builds.
    pub fn activate(&mut self, key: impl AsRef<str>) {
        match SubscriptionKey::new(key.as_ref()) {
            Ok(key) => self.activate_key(key),
            Err(e) => {
                debug_assert!(false, "activate called with invalid key: {e}");
                tracing::warn!(error = %e, "ignoring activation with invalid key");
            }
        }
    }

    /// Open (or keep) the subscription for an already validated key
    pub fn activate_key(&mut self, key: SubscriptionKey) {
        if self.state.is_live() && self.key.as_ref() == Some(&key) {
            tracing::debug!(%key, "subscription already active");
            return;
        }

        self.teardown();

        let key_changed = self.key.as_ref() != Some(&key);
        if key_changed {
            // A sample of another entity must never be shown for this one.
            self.position = None;
        }
        if key_changed || self.state.is_at_rest() {
            self.consecutive_failures = 0;
            self.last_error = None;
        }
        self.budget.reset();
        self.key = Some(key);

        self.open_current();
        self.publish();
    }

    /// Tear down the subscription and any pending reconnect. Idempotent.
    pub fn deactivate(&mut self) {
        self.teardown();
        self.generation = self.generation.next();
        self.budget.reset();
        self.consecutive_failures = 0;
        self.last_error = None;

        if self.state != ConnectionState::Disconnected {
            if let Some(key) = &self.key {
                tracing::info!(%key, "tracking stream disconnected");
            }
            self.transition(ConnectionState::Disconnected);
            self.publish();
        }
    }

    /// Manual retry after failures; only acts in the `Error` state
    pub fn retry(&mut self) -> bool {
        if self.state != ConnectionState::Error {
            return false;
        }
        match self.key.clone() {
            Some(key) => {
                tracing::info!(%key, "manual retry requested");
                self.activate_key(key);
                true
            }
            None => false,
        }
    }

    /// Transport acknowledged the subscription
    pub fn on_open(&mut self, generation: Generation) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            tracing::debug!(%generation, current = %self.generation, "ignoring stale open");
            return;
        }

        self.budget.reset();
        self.consecutive_failures = 0;
        self.last_error = None;
        if let Some(key) = &self.key {
            tracing::info!(%key, %generation, "tracking stream connected");
        }
        self.transition(ConnectionState::Connected);
        self.publish();
    }

    /// One inbound stream message; bad messages are dropped without a state change
    pub fn on_message(&mut self, generation: Generation, payload: &str) {
        if generation != self.generation || !self.state.is_live() {
            tracing::debug!(%generation, current = %self.generation, "ignoring stale message");
            return;
        }

        match self.parser.parse(payload) {
            Ok(position) => {
                self.feed.emit_position(&position);
                self.feed
                    .emit_event(&ConnectionEvent::PositionUpdated(position.clone()));
                self.position = Some(position);
                self.publish();
            }
            Err(e) => {
                tracing::debug!(error = %e, "discarding tracking message");
                self.feed.emit_event(&ConnectionEvent::MessageDiscarded {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Transport reported an error or an unexpected close
    pub fn on_failure(&mut self, generation: Generation, error: TransportError) {
        if generation != self.generation || !self.state.is_live() {
            tracing::debug!(%generation, error = %error, "ignoring stale failure");
            return;
        }
        self.handle_failure(error);
        self.publish();
    }

    /// The reconnect timer armed under `generation` elapsed
    pub fn on_retry_due(&mut self, generation: Generation) {
        if generation != self.generation || self.state != ConnectionState::Error {
            tracing::debug!(%generation, current = %self.generation, "ignoring stale retry timer");
            return;
        }
        if self.key.is_none() {
            return;
        }
        // The reconnect keeps the spent budget; only an explicit activation resets it.
        self.scheduler.cancel();
        self.open_current();
        self.publish();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn key(&self) -> Option<&SubscriptionKey> {
        self.key.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn attempts_used(&self) -> u32 {
        self.budget.attempts_used
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn retry_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            state: self.state,
            key: self.key.clone(),
            position: self.position.clone(),
            attempts_used: self.budget.attempts_used,
            max_attempts: self.budget.max_attempts,
            consecutive_failures: self.consecutive_failures,
            retry_pending: self.scheduler.is_pending(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn feed_mut(&mut self) -> &mut TrackingFeed {
        &mut self.feed
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    fn open_current(&mut self) {
        let Some(key) = self.key.clone() else {
            return;
        };

        self.generation = self.generation.next();
        self.transition(ConnectionState::Connecting);
        tracing::debug!(%key, generation = %self.generation, "opening tracking stream");

        if let Err(e) = self.transport.open(&key, self.generation) {
            self.handle_failure(e);
        }
    }

    fn handle_failure(&mut self, error: TransportError) {
        self.transport.close();
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.transition(ConnectionState::Error);

        match self.budget.consume(self.base_delay) {
            Some(delay) => {
                let attempt = self.budget.attempts_used;
                tracing::warn!(
                    error = %error,
                    attempt,
                    max_attempts = self.budget.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "tracking stream failed, reconnect scheduled"
                );
                self.scheduler.schedule(self.generation, delay);
                self.feed
                    .emit_event(&ConnectionEvent::RetryScheduled { attempt, delay });
            }
            None => {
                tracing::warn!(
                    error = %error,
                    consecutive_failures = self.consecutive_failures,
                    "tracking stream failed, retry budget exhausted"
                );
                self.feed.emit_event(&ConnectionEvent::RetryExhausted {
                    consecutive_failures: self.consecutive_failures,
                });
            }
        }
    }

    fn teardown(&mut self) {
        self.transport.close();
        self.scheduler.cancel();
    }

    fn transition(&mut self, new_state: ConnectionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        self.feed.emit_event(&ConnectionEvent::StateChanged {
            old_state,
            new_state,
        });
    }

    fn publish(&self) {
        self.feed.emit_snapshot(&self.snapshot());
    }
}

impl<T: TelemetryTransport, S: RetryScheduler> Drop for StreamConnection<T, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
