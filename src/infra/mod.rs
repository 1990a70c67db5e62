//! Runtime bootstrap: tracing, metrics descriptions and infra errors.

pub mod error;
pub mod telemetry;
