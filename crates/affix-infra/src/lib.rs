//! Affix Infrastructure Library
//!
//! Shared process setup for hosts embedding affix: tracing subscriber initialization.

pub mod telemetry;

pub use telemetry::{init_telemetry, LogFormat};
