//! Observability setup for the chat server: tracing subscriber initialization
//! with optional OpenTelemetry span export.

pub mod tracing_setup;
