//! Core data types for live trip tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One telemetry sample for the tracked vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Server-reported sample time, advisory only
    pub timestamp: Option<String>,
    /// Ground speed as reported by the device
    pub speed: Option<f64>,
    /// Heading in degrees as reported by the device
    pub heading: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: None,
            speed: None,
            heading: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Parse the advisory timestamp as RFC 3339, if present and well formed
    pub fn sample_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Health of the underlying telemetry subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Fresh instance, nothing opened yet
    Idle,
    Connecting,
    Connected,
    /// Last connection failed; a retry may be pending
    Error,
    /// Torn down by an explicit deactivate
    Disconnected,
}

impl ConnectionState {
    /// True while an underlying connection is open or opening
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// True for the two resting states with nothing open and nothing scheduled
    pub fn is_at_rest(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Disconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected subscription key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("subscription key must not be empty")]
    Empty,
}

/// Identifier of the tracked entity (trip id), never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KeyError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubscriptionKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubscriptionKey> for String {
    fn from(key: SubscriptionKey) -> Self {
        key.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token tagging one opened connection or one scheduled retry.
///
/// Callbacks carrying a generation other than the current one are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bounded budget of automatic reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts_used: u32,
    pub max_attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_used: 0,
            max_attempts,
        }
    }

    pub fn reset(&mut self) {
        self.attempts_used = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    /// Spend one attempt and return its delay, or `None` once exhausted.
    ///
    /// The schedule is linear: `base * 1`, `base * 2`, ... `base * max_attempts`.
    pub fn consume(&mut self, base: Duration) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = base * (self.attempts_used + 1);
        self.attempts_used += 1;
        Some(delay)
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(crate::core::MAX_RETRY_ATTEMPTS)
    }
}
