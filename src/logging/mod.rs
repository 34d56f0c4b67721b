//! Structured logging setup and one-JSON-object-per-line output.

mod format;

pub use format::{LogEvent, StructuredLogger};
