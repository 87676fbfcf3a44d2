use crate::core::Position;

/// Reasons a decoded sample is refused before it reaches the feed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Devices without a fix report the (0, 0) pair
    #[error("unset position sentinel (0, 0)")]
    UnsetSentinel,
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Validates telemetry samples before they are surfaced
#[derive(Debug, Clone)]
pub struct PositionValidator {
    /// Reject coordinates outside the WGS84 lat/lng ranges
    pub check_ranges: bool,
}

impl PositionValidator {
    pub fn new() -> Self {
        Self { check_ranges: true }
    }

    /// Validator that only applies the sentinel and finiteness rules
    pub fn lenient() -> Self {
        Self {
            check_ranges: false,
        }
    }

    pub fn validate(&self, position: &Position) -> Result<(), ValidationError> {
        check_finite("latitude", position.latitude)?;
        check_finite("longitude", position.longitude)?;

        if position.latitude == 0.0 && position.longitude == 0.0 {
            return Err(ValidationError::UnsetSentinel);
        }

        if self.check_ranges {
            if !(-90.0..=90.0).contains(&position.latitude) {
                return Err(ValidationError::OutOfRange {
                    field: "latitude",
                    value: position.latitude,
                });
            }
            if !(-180.0..=180.0).contains(&position.longitude) {
                return Err(ValidationError::OutOfRange {
                    field: "longitude",
                    value: position.longitude,
                });
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, position: &Position) -> bool {
        self.validate(position).is_ok()
    }
}

impl Default for PositionValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_regular_fix() {
        let validator = PositionValidator::new();
        assert!(validator.is_valid(&Position::new(12.9, 77.6)));
        // A single zero coordinate is a real place on the equator / meridian.
        assert!(validator.is_valid(&Position::new(0.0, 32.5)));
        assert!(validator.is_valid(&Position::new(-33.9, 0.0)));
    }

    #[test]
    fn test_rejects_sentinel() {
        let validator = PositionValidator::new();
        assert_eq!(
            validator.validate(&Position::new(0.0, 0.0)),
            Err(ValidationError::UnsetSentinel)
        );
    }

    #[test]
    fn test_rejects_non_finite() {
        let validator = PositionValidator::lenient();
        assert!(matches!(
            validator.validate(&Position::new(f64::NAN, 77.6)),
            Err(ValidationError::NonFinite { field: "latitude", .. })
        ));
        assert!(matches!(
            validator.validate(&Position::new(12.9, f64::INFINITY)),
            Err(ValidationError::NonFinite { field: "longitude", .. })
        ));
    }

    #[test]
    fn test_range_checks() {
        let strict = PositionValidator::new();
        assert!(matches!(
            strict.validate(&Position::new(91.0, 10.0)),
            Err(ValidationError::OutOfRange { field: "latitude", .. })
        ));
        assert!(matches!(
            strict.validate(&Position::new(10.0, -180.5)),
            Err(ValidationError::OutOfRange { field: "longitude", .. })
        ));

        let lenient = PositionValidator::lenient();
        assert!(lenient.is_valid(&Position::new(91.0, 10.0)));
    }
}
