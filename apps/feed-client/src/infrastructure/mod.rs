//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus ambient concerns.

/// JSON codec for frames, state changes and outgoing messages.
pub mod codec;

/// Configuration loading.
pub mod config;

/// In-memory endpoint adapter.
pub mod loopback;

/// Metrics instrumentation.
pub mod metrics;

/// Tracing subscriber initialization.
pub mod telemetry;
