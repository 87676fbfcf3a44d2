//! Core types and constants for live trip tracking

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
