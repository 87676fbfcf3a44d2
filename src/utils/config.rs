use crate::core::{
    RetryBudget, SubscriptionKey, BASE_RETRY_DELAY, DEFAULT_RESOURCE,
    DEFAULT_VISIBILITY_THRESHOLD, MAX_RETRY_ATTEMPTS, STREAM_PATH_SUFFIX,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable overriding [`TrackingConfig::base_url`]
pub const BASE_URL_ENV: &str = "TRACKING_BASE_URL";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {message}")]
    IoError { message: String },
    #[error("serialization error: {message}")]
    SerializationError { message: String },
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No logging
    None,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Tracking connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// API root the stream endpoint hangs off, e.g. `https://api.example.com/v1`
    pub base_url: String,
    /// Collection segment before the key (`trips`)
    pub resource: String,
    /// Base delay of the linear reconnect schedule (milliseconds)
    pub base_retry_delay_ms: u64,
    /// Automatic reconnect attempts before a manual retry is required
    pub max_retry_attempts: u32,
    /// Intersection ratio at which the view counts as visible (0, 1]
    pub visibility_threshold: f64,
    /// Timeout for establishing the HTTP connection (milliseconds)
    pub connect_timeout_ms: u64,
    pub log_level: LogLevel,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            base_retry_delay_ms: BASE_RETRY_DELAY.as_millis() as u64,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            connect_timeout_ms: 10_000,
            log_level: LogLevel::Info,
        }
    }
}

impl TrackingConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: TrackingConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path_str, e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to serialize config: {}", e),
            })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(invalid("base_url", base, "must not be empty"));
        }
        let parsed = Url::parse(base).map_err(|e| invalid("base_url", base, &e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("base_url", base, "must be a hierarchical URL"));
        }

        if self.resource.trim_matches('/').is_empty() {
            return Err(invalid("resource", &self.resource, "must not be empty"));
        }

        if self.base_retry_delay_ms == 0 {
            return Err(invalid("base_retry_delay_ms", "0", "must be positive"));
        }

        if !(self.visibility_threshold > 0.0 && self.visibility_threshold <= 1.0) {
            return Err(invalid(
                "visibility_threshold",
                &self.visibility_threshold.to_string(),
                "must be within (0, 1]",
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "0", "must be positive"));
        }

        Ok(())
    }

    /// Endpoint of the per-key telemetry stream.
    ///
    /// `{base_url}/{resource}/{key}/tracking-stream`; a trailing slash on the
    /// base URL does not produce an empty segment and the key is percent-encoded.
    pub fn stream_url(&self, key: &SubscriptionKey) -> ConfigResult<Url> {
        let base = self.base_url.trim().trim_end_matches('/');
        let mut url = Url::parse(base).map_err(|e| invalid("base_url", base, &e.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| invalid("base_url", base, "must be a hierarchical URL"))?
            .pop_if_empty()
            .extend(self.resource.split('/').filter(|s| !s.is_empty()))
            .push(key.as_str())
            .push(STREAM_PATH_SUFFIX);

        Ok(url)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retry_attempts)
    }
}

fn invalid(parameter: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SubscriptionKey {
        SubscriptionKey::new(raw).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TrackingConfig::default();
        assert_eq!(config.base_retry_delay(), Duration::from_secs(3));
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.visibility_threshold, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_url_trailing_slash() {
        let mut config = TrackingConfig::default();
        config.base_url = "https://api.example.com/v1/".to_string();
        let url = config.stream_url(&key("42")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/trips/42/tracking-stream");

        config.base_url = "https://api.example.com".to_string();
        let url = config.stream_url(&key("42")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/trips/42/tracking-stream");
    }

    #[test]
    fn test_stream_url_encodes_key() {
        let mut config = TrackingConfig::default();
        config.resource = "/fleet/trips/".to_string();
        let url = config.stream_url(&key("a b/c")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/fleet/trips/a%20b%2Fc/tracking-stream"
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TrackingConfig::default();
        config.base_url = "".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. }) if parameter == "base_url"
        ));

        let mut config = TrackingConfig::default();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = TrackingConfig::default();
        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TrackingConfig::default();
        config.visibility_threshold = 0.0;
        assert!(config.validate().is_err());
        config.visibility_threshold = 1.5;
        assert!(config.validate().is_err());
        config.visibility_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        let config = TrackingConfig::default().with_overrides_from(|name| {
            (name == BASE_URL_ENV).then(|| " https://tracking.example.com/ ".to_string())
        });
        assert_eq!(config.base_url, "https://tracking.example.com/");

        let untouched = TrackingConfig::default().with_overrides_from(|_| Some("  ".to_string()));
        assert_eq!(untouched.base_url, TrackingConfig::default().base_url);
    }

    #[test]
    fn test_file_round_trip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.json");

        let mut config = TrackingConfig::default();
        config.base_url = "https://api.example.com".to_string();
        config.log_level = LogLevel::Debug;
        config.save_to_file(&path).unwrap();
        assert_eq!(TrackingConfig::from_file(&path).unwrap(), config);

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"base_url": "https://x.example.com", "max_retry_attempts": 5}"#)
            .unwrap();
        let loaded = TrackingConfig::from_file(&partial).unwrap();
        assert_eq!(loaded.max_retry_attempts, 5);
        assert_eq!(loaded.resource, "trips");
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = TrackingConfig::from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::IoError { .. })));

        let garbled = dir.path().join("garbled.json");
        fs::write(&garbled, "{ not json").unwrap();
        assert!(matches!(
            TrackingConfig::from_file(&garbled),
            Err(ConfigError::SerializationError { .. })
        ));

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{"visibility_threshold": 2.0}"#).unwrap();
        assert!(matches!(
            TrackingConfig::from_file(&invalid),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::None.as_filter(), "off");
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
    }
}
