//! Presentation feed types

use crate::core::{ConnectionState, Position, SubscriptionKey};
use serde::Serialize;
use std::time::Duration;

/// Everything the rendering layer needs to draw the live tracking panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub state: ConnectionState,
    /// Key of the current (or last) subscription
    pub key: Option<SubscriptionKey>,
    /// Latest valid sample, if any
    pub position: Option<Position>,
    /// Automatic reconnect attempts spent since the last success
    pub attempts_used: u32,
    pub max_attempts: u32,
    /// Failed connections in a row since the last successful open
    pub consecutive_failures: u32,
    /// A reconnect timer is armed
    pub retry_pending: bool,
    /// Description of the last transport failure
    pub last_error: Option<String>,
}

impl TrackingSnapshot {
    pub fn idle(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            key: None,
            position: None,
            attempts_used: 0,
            max_attempts,
            consecutive_failures: 0,
            retry_pending: false,
            last_error: None,
        }
    }

    /// The automatic budget is spent and only a manual retry can reconnect
    pub fn retry_exhausted(&self) -> bool {
        self.state == ConnectionState::Error
            && !self.retry_pending
            && self.attempts_used >= self.max_attempts
    }
}

/// Notifications emitted by the stream connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        old_state: ConnectionState,
        new_state: ConnectionState,
    },
    PositionUpdated(Position),
    /// A message was dropped without affecting the connection
    MessageDiscarded { reason: String },
    RetryScheduled { attempt: u32, delay: Duration },
    RetryExhausted { consecutive_failures: u32 },
}
