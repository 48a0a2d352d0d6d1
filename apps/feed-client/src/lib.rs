#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Feed Client - Market Data Subscription Manager
//!
//! A client-side subscription manager for a streaming market data feed.
//! Many listeners may register interest in the same `(event type, symbol)`
//! pair; the client coalesces that interest into minimal subscribe and
//! unsubscribe deltas, batches churn into one message per scheduling turn,
//! and demultiplexes compact columnar frames back to every listener.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Event model, wire shapes and pure state machines
//!   - `events`, `event_flags`: Decoded events and their flag bits
//!   - `subscription`: Listener tables, pending queue, watermark algebra
//!   - `aggregator`, `snapshot`: Bounded range queries and live ordered views
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `Endpoint` transport collaborator
//!   - `services`: Subscription runtime, deferred results, `Feed` facade
//!
//! - **Infrastructure**: Adapters and ambient concerns
//!   - `codec`: JSON payload encoding
//!   - `config`: Environment configuration
//!   - `loopback`: In-memory endpoint
//!   - `metrics`, `telemetry`: Instrumentation
//!
//! # Data Flow
//!
//! ```text
//!                 subscribe / unsubscribe
//! Listener 1 ──┐        ┌──────────────┐   batched delta   ┌──────────┐
//! Listener 2 ──┼───────►│ Subscriptions│──────────────────►│ Endpoint │
//! Listener N ──┘        │   (book)     │◄──────────────────│          │
//!      ▲                └──────┬───────┘   columnar frame  └──────────┘
//!      └───────── events ──────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregator::{AggregatorResult, TimeSeriesAggregator};
pub use domain::event_flags::EventFlags;
pub use domain::events::{Event, EventType, FieldValue};
pub use domain::snapshot::SnapshotView;
pub use domain::state::{FeedState, FeedStateChange};
pub use domain::subscription::{ListenerId, SubscriptionStats};
pub use domain::wire::{DataFrame, FrameHead, SubscribeMessage, TimeSeriesItem};

// Ports
pub use application::ports::{
    DataChangeHandler, Endpoint, EndpointError, OnDemandMessage, StateChangeHandler,
};

// Services
pub use application::services::{
    Deferred, DeferredResult, Feed, FeedError, SubscriptionHandle, Subscriptions,
    TimeSeriesOptions,
};

// Infrastructure
pub use infrastructure::codec::{CodecError, JsonCodec};
pub use infrastructure::config::{AuthToken, ConfigError, FeedConfig};
pub use infrastructure::loopback::LoopbackEndpoint;
pub use infrastructure::metrics::describe_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryError, init as init_telemetry};

// Cancellation for bounded queries
pub use tokio_util::sync::CancellationToken;
