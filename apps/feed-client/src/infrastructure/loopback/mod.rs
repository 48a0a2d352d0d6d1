//! Loopback Endpoint
//!
//! In-memory [`Endpoint`] that records everything sent to it and lets the
//! caller inject inbound state changes and data frames. Useful for tests and
//! for wiring a feed before a real transport is available.
//!
//! Handlers are always invoked with no internal lock held, so they may call
//! back into the endpoint.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::application::ports::{
    DataChangeHandler, Endpoint, EndpointError, OnDemandMessage, StateChangeHandler,
};
use crate::domain::state::FeedStateChange;
use crate::domain::wire::{DataFrame, SubscribeMessage};
use crate::infrastructure::codec::{CodecError, JsonCodec};
use crate::infrastructure::metrics::{self, DropReason};

/// In-memory endpoint.
#[derive(Default)]
pub struct LoopbackEndpoint {
    connected: AtomicBool,
    url: Mutex<Option<String>>,
    auth_token: Mutex<Option<String>>,
    state_handler: Mutex<Option<StateChangeHandler>>,
    data_handler: Mutex<Option<DataChangeHandler>>,
    subscription_messages: Mutex<Vec<SubscribeMessage>>,
    on_demand_messages: Mutex<Vec<OnDemandMessage>>,
    codec: JsonCodec,
}

impl std::fmt::Debug for LoopbackEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackEndpoint")
            .field("connected", &self.is_connected())
            .field("url", &*self.url.lock())
            .field("subscription_messages", &self.subscription_messages.lock().len())
            .field("on_demand_messages", &self.on_demand_messages.lock().len())
            .finish_non_exhaustive()
    }
}

impl LoopbackEndpoint {
    /// Create a disconnected endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the transport flag without notifying the state handler.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Whether sends currently succeed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// URL passed to the last `connect`.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Token passed to the last `set_auth_token`.
    #[must_use]
    pub fn auth_token(&self) -> Option<String> {
        self.auth_token.lock().clone()
    }

    /// Subscription messages received so far.
    #[must_use]
    pub fn subscription_messages(&self) -> Vec<SubscribeMessage> {
        self.subscription_messages.lock().clone()
    }

    /// Drain the recorded subscription messages.
    pub fn take_subscription_messages(&self) -> Vec<SubscribeMessage> {
        std::mem::take(&mut *self.subscription_messages.lock())
    }

    /// On-demand requests received so far.
    #[must_use]
    pub fn on_demand_messages(&self) -> Vec<OnDemandMessage> {
        self.on_demand_messages.lock().clone()
    }

    /// Deliver a state change to the registered handler.
    pub fn emit_state(&self, change: FeedStateChange) {
        let handler = self.state_handler.lock().clone();
        match handler {
            Some(handler) => handler(change),
            None => tracing::debug!("No state handler registered"),
        }
    }

    /// Deliver a data frame to the registered handler.
    pub fn emit_data(&self, frame: DataFrame, time_series: bool) {
        let handler = self.data_handler.lock().clone();
        match handler {
            Some(handler) => handler(frame, time_series),
            None => tracing::debug!("No data handler registered"),
        }
    }

    /// Decode a raw JSON frame and deliver it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid frame.
    pub fn emit_raw_data(&self, text: &str, time_series: bool) -> Result<(), CodecError> {
        let frame = self.codec.decode_frame(text).inspect_err(|err| {
            tracing::debug!(error = %err, "Dropping malformed frame");
            metrics::record_frame_dropped(DropReason::Malformed);
        })?;
        self.emit_data(frame, time_series);
        Ok(())
    }

    /// Decode a raw JSON state change and deliver it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid state object.
    pub fn emit_raw_state(&self, text: &str) -> Result<(), CodecError> {
        let change = self.codec.decode_state(text)?;
        self.emit_state(change);
        Ok(())
    }
}

impl Endpoint for LoopbackEndpoint {
    fn connect(&self, url: &str) -> Result<(), EndpointError> {
        *self.url.lock() = Some(url.to_string());
        self.set_connected(true);
        self.emit_state(FeedStateChange::connected(true));
        Ok(())
    }

    fn disconnect(&self) {
        self.set_connected(false);
        self.emit_state(FeedStateChange::connected(false));
    }

    fn set_auth_token(&self, token: &str) {
        *self.auth_token.lock() = Some(token.to_string());
    }

    fn register_state_change_handler(&self, handler: StateChangeHandler) {
        *self.state_handler.lock() = Some(handler);
    }

    fn register_data_change_handler(&self, handler: DataChangeHandler) {
        *self.data_handler.lock() = Some(handler);
    }

    fn update_subscriptions(&self, message: &SubscribeMessage) -> Result<(), EndpointError> {
        if !self.is_connected() {
            return Err(EndpointError::NotConnected);
        }

        self.subscription_messages.lock().push(message.clone());
        Ok(())
    }

    fn invoke_on_demand_service(&self, message: &OnDemandMessage) -> Result<(), EndpointError> {
        if !self.is_connected() {
            return Err(EndpointError::NotConnected);
        }

        self.on_demand_messages.lock().push(message.clone());
        Ok(())
    }
}
