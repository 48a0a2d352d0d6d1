//! Feed Facade
//!
//! Public entry point composing an [`Endpoint`] with the [`Subscriptions`]
//! runtime. Adds the two higher-level consumption patterns:
//!
//! - [`Feed::get_time_series`]: collect a bounded time range once
//! - [`Feed::subscribe_time_series_snapshot`]: follow a consistent live view
//!
//! and the on-demand replay controls.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use parking_lot::Mutex;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Endpoint, OnDemandMessage};
use crate::application::services::deferred::{Deferred, DeferredResult};
use crate::application::services::subscriptions::{
    DEFAULT_MAX_QUEUE_SIZE, SubscriptionHandle, Subscriptions,
};
use crate::application::services::FeedError;
use crate::domain::aggregator::{AggregatorResult, TimeSeriesAggregator};
use crate::domain::events::{Event, EventType};
use crate::domain::snapshot::SnapshotView;
use crate::domain::state::{FeedState, FeedStateChange};
use crate::infrastructure::config::{DEFAULT_TIME_SERIES_TIMEOUT, FeedConfig};

/// Options for [`Feed::get_time_series`].
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesOptions {
    /// Deadline; the feed's configured default when `None`.
    pub timeout: Option<Duration>,
    /// Cancels the query with [`FeedError::Aborted`] when triggered.
    pub cancel: Option<CancellationToken>,
}

/// Market data feed.
#[derive(Debug, Clone)]
pub struct Feed {
    subscriptions: Subscriptions,
    time_series_timeout: Duration,
}

impl Feed {
    /// Create a feed over `endpoint` with default settings.
    #[must_use]
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            subscriptions: Subscriptions::new(endpoint, DEFAULT_MAX_QUEUE_SIZE),
            time_series_timeout: DEFAULT_TIME_SERIES_TIMEOUT,
        }
    }

    /// Create a feed over `endpoint` applying `config`.
    ///
    /// The configured auth token is handed to the endpoint. When a URL is
    /// configured the feed connects to it before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting to the configured URL fails.
    pub fn from_config(
        endpoint: Arc<dyn Endpoint>,
        config: &FeedConfig,
    ) -> Result<Self, FeedError> {
        if let Some(token) = &config.auth_token {
            endpoint.set_auth_token(token.expose());
        }

        let feed = Self {
            subscriptions: Subscriptions::new(endpoint, config.max_queue_size),
            time_series_timeout: config.time_series_timeout,
        };

        if let Some(url) = &config.url {
            feed.connect(url)?;
        }

        Ok(feed)
    }

    /// Override the default bounded query deadline.
    #[must_use]
    pub const fn with_time_series_timeout(mut self, timeout: Duration) -> Self {
        self.time_series_timeout = timeout;
        self
    }

    /// The underlying subscription runtime.
    #[must_use]
    pub const fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Set the session auth token.
    pub fn set_auth_token(&self, token: &str) {
        self.endpoint().set_auth_token(token);
    }

    /// Connect to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot establish the session.
    pub fn connect(&self, url: &str) -> Result<(), FeedError> {
        tracing::info!(url, "Connecting feed");
        self.endpoint().connect(url)?;
        Ok(())
    }

    /// Disconnect the session.
    pub fn disconnect(&self) {
        tracing::info!("Disconnecting feed");
        self.endpoint().disconnect();
    }

    /// Current feed state.
    #[must_use]
    pub fn state(&self) -> FeedState {
        self.subscriptions.state()
    }

    /// Watch every subsequent state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.subscriptions.subscribe_state()
    }

    fn endpoint(&self) -> &Arc<dyn Endpoint> {
        self.subscriptions.endpoint()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to live events for every `(type, symbol)` pair.
    pub fn subscribe<S, F>(
        &self,
        event_types: &[EventType],
        symbols: &[S],
        listener: F,
    ) -> SubscriptionHandle
    where
        S: AsRef<str>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(event_types, symbols, listener)
    }

    /// Subscribe to time-series events from `from_time` onwards.
    pub fn subscribe_time_series<S, F>(
        &self,
        event_types: &[EventType],
        symbols: &[S],
        from_time: Option<i64>,
        listener: F,
    ) -> SubscriptionHandle
    where
        S: AsRef<str>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscriptions
            .subscribe_time_series(event_types, symbols, from_time, listener)
    }

    /// Follow a consistent, ordered view of one time series.
    ///
    /// `listener` receives the whole view, sorted by `index`, each time a
    /// snapshot or transaction boundary closes with an actual change.
    pub fn subscribe_time_series_snapshot<F>(
        &self,
        event_type: EventType,
        symbol: &str,
        from_time: Option<i64>,
        listener: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&[Event]) + Send + Sync + 'static,
    {
        let view = Mutex::new(SnapshotView::new());

        self.subscriptions
            .subscribe_time_series(&[event_type], &[symbol], from_time, move |event| {
                let emitted = view.lock().on_event(event.clone());
                if let Some(events) = emitted {
                    listener(&events);
                }
            })
    }

    /// Collect every event of one series within `[from_time, to_time]`.
    ///
    /// Requires incoming events to carry `index`, `time` and `eventFlags`,
    /// and should not be combined with another time-series subscription on
    /// the same key. The underlying subscription is released exactly once,
    /// on success, timeout, cancellation, or when the result is dropped.
    ///
    /// Timers and cancellation need a Tokio runtime; without one the query
    /// can only complete or be dropped.
    pub fn get_time_series(
        &self,
        event_type: EventType,
        symbol: &str,
        from_time: i64,
        to_time: i64,
        options: TimeSeriesOptions,
    ) -> DeferredResult<Vec<Event>> {
        let (deferred, result) = Deferred::new();
        let timeout = options.timeout.unwrap_or(self.time_series_timeout);

        if let Ok(runtime) = Handle::try_current() {
            deferred.use_resource(|| {
                let rejecter = deferred.clone();
                let timer = runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    rejecter.reject(FeedError::Timeout);
                });
                let timer = timer.abort_handle();
                move || timer.abort()
            });

            if let Some(cancel) = options.cancel {
                deferred.use_resource(|| {
                    let rejecter = deferred.clone();
                    let watcher = runtime.spawn(async move {
                        cancel.cancelled().await;
                        rejecter.reject(FeedError::Aborted);
                    });
                    let watcher = watcher.abort_handle();
                    move || watcher.abort()
                });
            }
        } else {
            tracing::warn!(%event_type, symbol, "No runtime; time series request has no deadline");
        }

        deferred.use_resource(|| {
            let aggregator = Mutex::new(TimeSeriesAggregator::new(from_time, to_time));
            let resolver = deferred.clone();

            let handle = self.subscriptions.subscribe_time_series(
                &[event_type],
                &[symbol],
                Some(from_time),
                move |event| {
                    let outcome = aggregator.lock().on_event(event);
                    if let AggregatorResult::Finished(events) = outcome {
                        tracing::debug!(count = events.len(), "Time series request finished");
                        resolver.resolve(events);
                    }
                },
            );

            move || handle.unsubscribe()
        });

        result
    }

    // =========================================================================
    // Replay Controls
    // =========================================================================

    /// Change replay speed.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, when replay is unsupported, or when the
    /// endpoint rejects the request.
    pub fn set_speed(&self, speed: f64) -> Result<(), FeedError> {
        self.invoke_on_demand(
            OnDemandMessage::new("setSpeed", vec![json!(speed)]),
            FeedStateChange {
                speed: Some(speed),
                ..FeedStateChange::default()
            },
        )
    }

    /// Start replaying from `from_time` (epoch milliseconds) at `speed`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, when replay is unsupported, when `from_time`
    /// is out of range, or when the endpoint rejects the request.
    pub fn replay(&self, speed: f64, from_time: i64) -> Result<(), FeedError> {
        let start = DateTime::from_timestamp_millis(from_time)
            .ok_or(FeedError::InvalidTime(from_time))?
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        self.invoke_on_demand(
            OnDemandMessage::new("replay", vec![json!(start), json!(speed)]),
            FeedStateChange {
                speed: Some(speed),
                replay: Some(true),
                clear: Some(false),
                time: Some(from_time),
                ..FeedStateChange::default()
            },
        )
    }

    /// Stop replaying and resume live data.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, when replay is unsupported, or when the
    /// endpoint rejects the request.
    pub fn stop(&self) -> Result<(), FeedError> {
        self.invoke_on_demand(
            OnDemandMessage::new("stopAndResume", Vec::new()),
            replay_stopped(false),
        )
    }

    /// Stop replaying and clear the replay buffer.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, when replay is unsupported, or when the
    /// endpoint rejects the request.
    pub fn clear(&self) -> Result<(), FeedError> {
        self.invoke_on_demand(
            OnDemandMessage::new("stopAndClear", Vec::new()),
            replay_stopped(true),
        )
    }

    fn invoke_on_demand(
        &self,
        message: OnDemandMessage,
        change: FeedStateChange,
    ) -> Result<(), FeedError> {
        let state = self.subscriptions.state();
        if !state.connected {
            return Err(FeedError::NotConnected);
        }
        if state.replay_supported != Some(true) {
            return Err(FeedError::ReplayNotSupported);
        }

        tracing::debug!(op = %message.op, "Invoking on-demand service");
        self.endpoint().invoke_on_demand_service(&message)?;
        self.subscriptions.change_state(&change);
        Ok(())
    }
}

fn replay_stopped(clear: bool) -> FeedStateChange {
    FeedStateChange {
        speed: Some(0.0),
        replay: Some(false),
        clear: Some(clear),
        time: Some(0),
        ..FeedStateChange::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{EndpointError, MockEndpoint, StateChangeHandler};

    fn mock_endpoint() -> (MockEndpoint, Arc<Mutex<Option<StateChangeHandler>>>) {
        let slot: Arc<Mutex<Option<StateChangeHandler>>> = Arc::new(Mutex::new(None));
        let mut endpoint = MockEndpoint::new();

        let state_slot = Arc::clone(&slot);
        endpoint
            .expect_register_state_change_handler()
            .times(1)
            .returning(move |handler| *state_slot.lock() = Some(handler));
        endpoint
            .expect_register_data_change_handler()
            .times(1)
            .return_const(());

        (endpoint, slot)
    }

    fn emit(slot: &Arc<Mutex<Option<StateChangeHandler>>>, change: FeedStateChange) {
        let handler = slot.lock().clone().unwrap();
        handler(change);
    }

    #[test]
    fn from_config_applies_token() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint
            .expect_set_auth_token()
            .withf(|token| token == "token-1")
            .times(1)
            .return_const(());

        let config = FeedConfig {
            auth_token: Some(crate::infrastructure::config::AuthToken::new("token-1".to_string())),
            ..FeedConfig::default()
        };

        let _feed = Feed::from_config(Arc::new(endpoint), &config).unwrap();
    }

    #[test]
    fn from_config_connects_to_configured_url() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint
            .expect_connect()
            .withf(|url| url == "wss://feed.example.com/cometd")
            .times(1)
            .returning(|_| Ok(()));

        let config = FeedConfig {
            url: Some("wss://feed.example.com/cometd".to_string()),
            ..FeedConfig::default()
        };

        assert!(Feed::from_config(Arc::new(endpoint), &config).is_ok());
    }

    #[test]
    fn from_config_reports_failed_connect() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint
            .expect_connect()
            .returning(|_| Err(EndpointError::Transport("refused".to_string())));

        let config = FeedConfig {
            url: Some("wss://down.example.com".to_string()),
            ..FeedConfig::default()
        };

        assert_eq!(
            Feed::from_config(Arc::new(endpoint), &config).unwrap_err(),
            FeedError::Endpoint(EndpointError::Transport("refused".to_string()))
        );
    }

    #[test]
    fn connect_delegates_to_endpoint() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint
            .expect_connect()
            .withf(|url| url == "wss://feed.example.com")
            .times(1)
            .returning(|_| Ok(()));
        endpoint
            .expect_connect()
            .withf(|url| url == "wss://down.example.com")
            .returning(|_| Err(EndpointError::Transport("refused".to_string())));
        endpoint.expect_disconnect().times(1).return_const(());

        let feed = Feed::new(Arc::new(endpoint));

        assert!(feed.connect("wss://feed.example.com").is_ok());
        assert_eq!(
            feed.connect("wss://down.example.com"),
            Err(FeedError::Endpoint(EndpointError::Transport("refused".to_string())))
        );
        feed.disconnect();
    }

    #[test]
    fn replay_controls_require_connection() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint.expect_invoke_on_demand_service().never();

        let feed = Feed::new(Arc::new(endpoint));

        assert_eq!(feed.stop(), Err(FeedError::NotConnected));
        assert_eq!(feed.set_speed(2.0), Err(FeedError::NotConnected));
    }

    #[test]
    fn replay_controls_require_announced_support() {
        let (mut endpoint, slot) = mock_endpoint();
        endpoint.expect_update_subscriptions().returning(|_| Ok(()));
        endpoint.expect_invoke_on_demand_service().never();

        let feed = Feed::new(Arc::new(endpoint));
        emit(&slot, FeedStateChange::connected(true));

        assert_eq!(feed.clear(), Err(FeedError::ReplayNotSupported));

        emit(
            &slot,
            FeedStateChange {
                replay_supported: Some(false),
                ..FeedStateChange::default()
            },
        );
        assert_eq!(feed.replay(1.0, 0), Err(FeedError::ReplayNotSupported));
    }

    #[test]
    fn replay_sends_iso_start_and_updates_state() {
        let (mut endpoint, slot) = mock_endpoint();
        endpoint.expect_update_subscriptions().returning(|_| Ok(()));
        endpoint
            .expect_invoke_on_demand_service()
            .withf(|message| {
                message.op == "replay"
                    && message.args == vec![json!("2020-05-21T11:00:00.000Z"), json!(2.0)]
            })
            .times(1)
            .returning(|_| Ok(()));

        let feed = Feed::new(Arc::new(endpoint));
        emit(
            &slot,
            FeedStateChange {
                connected: Some(true),
                replay_supported: Some(true),
                ..FeedStateChange::default()
            },
        );

        feed.replay(2.0, 1_590_058_800_000).unwrap();

        let state = feed.state();
        assert!(state.replay);
        assert!(!state.clear);
        assert_eq!(state.time, 1_590_058_800_000);
        assert!((state.speed - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stop_and_clear_reset_replay_state() {
        let (mut endpoint, slot) = mock_endpoint();
        endpoint.expect_update_subscriptions().returning(|_| Ok(()));
        endpoint
            .expect_invoke_on_demand_service()
            .times(3)
            .returning(|_| Ok(()));

        let feed = Feed::new(Arc::new(endpoint));
        emit(
            &slot,
            FeedStateChange {
                connected: Some(true),
                replay_supported: Some(true),
                ..FeedStateChange::default()
            },
        );

        feed.set_speed(4.0).unwrap();
        assert!((feed.state().speed - 4.0).abs() < f64::EPSILON);

        feed.clear().unwrap();
        let state = feed.state();
        assert!(state.clear);
        assert!(!state.replay);
        assert_eq!(state.time, 0);

        feed.stop().unwrap();
        assert!(!feed.state().clear);
    }

    #[test]
    fn rejected_on_demand_request_keeps_state() {
        let (mut endpoint, slot) = mock_endpoint();
        endpoint.expect_update_subscriptions().returning(|_| Ok(()));
        endpoint
            .expect_invoke_on_demand_service()
            .returning(|_| Err(EndpointError::NotConnected));

        let feed = Feed::new(Arc::new(endpoint));
        emit(
            &slot,
            FeedStateChange {
                connected: Some(true),
                replay_supported: Some(true),
                ..FeedStateChange::default()
            },
        );

        assert_eq!(
            feed.set_speed(8.0),
            Err(FeedError::Endpoint(EndpointError::NotConnected))
        );
        assert!(feed.state().speed.abs() < f64::EPSILON);
    }

    #[test]
    fn subscribe_sends_update_through_endpoint() {
        let (mut endpoint, _slot) = mock_endpoint();
        endpoint
            .expect_update_subscriptions()
            .withf(|message| message.add.get(&EventType::Quote) == Some(&vec!["AAPL".to_string()]))
            .times(1)
            .returning(|_| Ok(()));

        let feed = Feed::new(Arc::new(endpoint));
        let _handle = feed.subscribe(&[EventType::Quote], &["AAPL"], |_| {});
        feed.subscriptions().flush().unwrap();
    }
}
