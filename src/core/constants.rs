//! Tracking constants and default parameters

use std::time::Duration;

/// Maximum automatic reconnect attempts before a manual retry is required
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay of the linear reconnect schedule (3s, 6s, 9s)
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Fraction of the view that must be on screen to count as visible
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.1;

/// Default collection the tracking stream hangs off (`/trips/{key}/tracking-stream`)
pub const DEFAULT_RESOURCE: &str = "trips";

/// Path suffix of the per-entity telemetry stream
pub const STREAM_PATH_SUFFIX: &str = "tracking-stream";

/// Longest event-stream line accepted before the stream is treated as broken
pub const MAX_SSE_LINE_BYTES: usize = 64 * 1024;
