//! Port Interfaces
//!
//! Defines the transport collaborator the subscription runtime drives,
//! following the Hexagonal Architecture pattern. Adapters in the
//! infrastructure layer (or in a host application) implement [`Endpoint`].
//!
//! ## Driven Port (Outbound)
//!
//! - `update_subscriptions`: sends subscription deltas
//! - `invoke_on_demand_service`: sends replay control requests
//!
//! ## Callbacks (Inbound)
//!
//! - [`StateChangeHandler`]: partial connection/replay state updates
//! - [`DataChangeHandler`]: columnar data frames, tagged live or time-series

use std::sync::Arc;

use serde::Serialize;

use crate::domain::state::FeedStateChange;
use crate::domain::wire::{DataFrame, SubscribeMessage};

/// Receives partial state changes from the transport.
pub type StateChangeHandler = Arc<dyn Fn(FeedStateChange) + Send + Sync>;

/// Receives data frames; the flag is `true` for time-series frames.
pub type DataChangeHandler = Arc<dyn Fn(DataFrame, bool) + Send + Sync>;

/// Errors reported by an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// The transport session is not established.
    #[error("endpoint is not connected")]
    NotConnected,

    /// The transport failed to deliver.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote invocation request for the on-demand (replay) service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnDemandMessage {
    /// Operation name, e.g. `replay` or `setSpeed`.
    pub op: String,
    /// Positional arguments.
    pub args: Vec<serde_json::Value>,
}

impl OnDemandMessage {
    /// Create a request.
    #[must_use]
    pub fn new(op: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }
}

/// Transport collaborator for the feed.
///
/// Handlers are registered exactly once, when the subscription runtime is
/// constructed. Implementations may invoke them from any thread.
#[cfg_attr(test, mockall::automock)]
pub trait Endpoint: Send + Sync {
    /// Open the transport session to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be established.
    fn connect(&self, url: &str) -> Result<(), EndpointError>;

    /// Close the transport session.
    fn disconnect(&self);

    /// Set the token used to authenticate the session.
    fn set_auth_token(&self, token: &str);

    /// Register the state change callback.
    fn register_state_change_handler(&self, handler: StateChangeHandler);

    /// Register the data callback.
    fn register_data_change_handler(&self, handler: DataChangeHandler);

    /// Send a subscription delta.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::NotConnected`] if the session is down.
    fn update_subscriptions(&self, message: &SubscribeMessage) -> Result<(), EndpointError>;

    /// Send an on-demand service request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn invoke_on_demand_service(&self, message: &OnDemandMessage) -> Result<(), EndpointError>;
}
