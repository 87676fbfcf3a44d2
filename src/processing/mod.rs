//! Stream framing and message decoding

pub mod parser;
pub mod sse;

pub use parser::{ParseError, PositionParser};
pub use sse::{SseDecoder, SseEvent};
