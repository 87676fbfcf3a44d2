//! Snapshot presentation helpers
//!
//! Maps a [`TrackingSnapshot`] to the status indicator shown next to the map
//! and renders snapshots as JSON or human-readable text.

use crate::api::types::TrackingSnapshot;
use crate::core::{ConnectionState, Position};
use crate::validation::PositionValidator;
use serde::Serialize;
use std::fmt;

/// Connection indicator derived from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusIndicator {
    /// Not subscribed (idle or torn down)
    Paused,
    Connecting,
    Live,
    /// Failed with an automatic reconnect pending
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Retry budget exhausted; only a manual retry reconnects
    Offline,
}

impl StatusIndicator {
    pub fn from_snapshot(snapshot: &TrackingSnapshot) -> Self {
        match snapshot.state {
            ConnectionState::Idle | ConnectionState::Disconnected => StatusIndicator::Paused,
            ConnectionState::Connecting => StatusIndicator::Connecting,
            ConnectionState::Connected => StatusIndicator::Live,
            ConnectionState::Error if snapshot.retry_pending => StatusIndicator::Reconnecting {
                attempt: snapshot.attempts_used,
                max_attempts: snapshot.max_attempts,
            },
            ConnectionState::Error => StatusIndicator::Offline,
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            StatusIndicator::Paused => "Paused",
            StatusIndicator::Connecting => "Connecting...",
            StatusIndicator::Live => "Live Telemetry",
            StatusIndicator::Reconnecting { .. } => "Reconnecting...",
            StatusIndicator::Offline => "Offline",
        }
    }

    /// Whether a manual "retry" control should be offered
    pub fn shows_retry_affordance(&self) -> bool {
        matches!(self, StatusIndicator::Offline)
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusIndicator::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "{} ({}/{})", self.headline(), attempt, max_attempts),
            _ => f.write_str(self.headline()),
        }
    }
}

/// Position to centre the map on: the latest sample, else a valid fallback
pub fn display_position(
    snapshot: &TrackingSnapshot,
    fallback: Option<(f64, f64)>,
) -> Option<Position> {
    if let Some(position) = &snapshot.position {
        return Some(position.clone());
    }

    let (latitude, longitude) = fallback?;
    let candidate = Position::new(latitude, longitude);
    PositionValidator::new()
        .is_valid(&candidate)
        .then_some(candidate)
}

/// Renders a snapshot for logs or downstream consumers
pub trait SnapshotFormatter {
    fn format(&self, snapshot: &TrackingSnapshot) -> String;
}

/// Serializes the snapshot together with its indicator
#[derive(Debug, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

#[derive(Serialize)]
struct JsonView<'a> {
    indicator: StatusIndicator,
    retry_exhausted: bool,
    #[serde(flatten)]
    snapshot: &'a TrackingSnapshot,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, snapshot: &TrackingSnapshot) -> Result<String, serde_json::Error> {
        let view = JsonView {
            indicator: StatusIndicator::from_snapshot(snapshot),
            retry_exhausted: snapshot.retry_exhausted(),
            snapshot,
        };
        if self.pretty {
            serde_json::to_string_pretty(&view)
        } else {
            serde_json::to_string(&view)
        }
    }
}

impl SnapshotFormatter for JsonFormatter {
    fn format(&self, snapshot: &TrackingSnapshot) -> String {
        self.format_json(snapshot)
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

/// Human-readable one-line or multi-line summary
#[derive(Debug, Default)]
pub struct TextFormatter {
    pub compact: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compact() -> Self {
        Self { compact: true }
    }
}

impl SnapshotFormatter for TextFormatter {
    fn format(&self, snapshot: &TrackingSnapshot) -> String {
        let indicator = StatusIndicator::from_snapshot(snapshot);
        let key = snapshot.key.as_ref().map_or("-", |k| k.as_str());

        if self.compact {
            let mut line = format!("[{}] {}", key, indicator);
            if let Some(p) = &snapshot.position {
                line.push_str(&format!(" | {:.6}, {:.6}", p.latitude, p.longitude));
            }
            return line;
        }

        let mut output = format!("Trip {}: {}\n", key, indicator);
        output.push_str(&format!("  State:    {}\n", snapshot.state));
        match &snapshot.position {
            Some(p) => {
                output.push_str(&format!("  Position: {:.6}, {:.6}\n", p.latitude, p.longitude));
                if let Some(speed) = p.speed {
                    output.push_str(&format!("  Speed:    {:.1}\n", speed));
                }
                if let Some(heading) = p.heading {
                    output.push_str(&format!("  Heading:  {:.0}°\n", heading));
                }
                if let Some(time) = p.sample_time() {
                    output.push_str(&format!("  Sampled:  {}\n", time.to_rfc3339()));
                }
            }
            None => output.push_str("  Position: waiting for first sample\n"),
        }
        if snapshot.consecutive_failures > 0 {
            output.push_str(&format!("  Failures: {}\n", snapshot.consecutive_failures));
        }
        if let Some(error) = &snapshot.last_error {
            output.push_str(&format!("  Error:    {}\n", error));
        }
        if indicator.shows_retry_affordance() {
            output.push_str("  Connection lost. Retry to resume live updates.\n");
        }
        output
    }
}
