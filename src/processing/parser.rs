use crate::core::Position;
use crate::validation::{PositionValidator, ValidationError};
use serde::Deserialize;

/// Reasons an inbound telemetry message is discarded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON payload: {details}")]
    InvalidFormat { details: String },
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] ValidationError),
}

/// Wire shape of one tracking-stream message
#[derive(Debug, Deserialize)]
struct WireSample {
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
}

/// Decodes tracking-stream payloads into validated positions
#[derive(Debug, Clone, Default)]
pub struct PositionParser {
    validator: PositionValidator,
}

impl PositionParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(validator: PositionValidator) -> Self {
        Self { validator }
    }

    /// Parse one event payload; only fully valid samples come back as `Ok`
    pub fn parse(&self, payload: &str) -> Result<Position, ParseError> {
        let wire: WireSample =
            serde_json::from_str(payload).map_err(|e| ParseError::InvalidFormat {
                details: e.to_string(),
            })?;

        let latitude = wire.lat.ok_or(ParseError::MissingField { field: "lat" })?;
        let longitude = wire.lng.ok_or(ParseError::MissingField { field: "lng" })?;

        let position = Position {
            latitude,
            longitude,
            timestamp: wire.timestamp,
            speed: wire.speed,
            heading: wire.heading,
        };

        self.validator.validate(&position)?;
        Ok(position)
    }
}
