//! Application Services
//!
//! Services that orchestrate domain logic and drive the endpoint port.
//!
//! - [`Subscriptions`]: listener registry, batched flushing and demultiplexing
//! - [`Deferred`]: one-shot result carrying guaranteed release actions
//! - [`Feed`]: public facade with bounded queries, snapshots and replay controls

mod deferred;
mod feed;
mod subscriptions;

pub use deferred::{Deferred, DeferredResult};
pub use feed::Feed;
pub use feed::TimeSeriesOptions;
pub use subscriptions::{DEFAULT_MAX_QUEUE_SIZE, Listener, SubscriptionHandle, Subscriptions};

use crate::application::ports::EndpointError;

/// Errors surfaced by the feed facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The operation requires an established connection.
    #[error("feed is not connected")]
    NotConnected,

    /// Replay support is absent or not yet announced by the server.
    #[error("replay is not supported by the connected server")]
    ReplayNotSupported,

    /// A replay start time is outside the representable range.
    #[error("invalid replay start time: {0}")]
    InvalidTime(i64),

    /// A bounded query did not complete within its deadline.
    #[error("time series request timed out")]
    Timeout,

    /// A bounded query was cancelled by the caller.
    #[error("time series request was aborted")]
    Aborted,

    /// The endpoint rejected a request.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}
