//! Domain Layer - Core feed types and subscription logic.
//!
//! This layer contains the event model, the wire shapes, and the state
//! machines that decide what to send and how to interpret what arrives.
//! Nothing here performs I/O or depends on an async runtime.

/// Time-range aggregation for bounded queries.
pub mod aggregator;

/// Transaction and snapshot flag decoding.
pub mod event_flags;

/// Market data event types.
pub mod events;

/// Materialized snapshot views of indexed series.
pub mod snapshot;

/// Connection and replay state.
pub mod state;

/// Subscription tracking and batching.
pub mod subscription;

/// Outgoing message and incoming frame shapes.
pub mod wire;
