//! Telemetry sample validation

pub mod data;

pub use data::{PositionValidator, ValidationError};
