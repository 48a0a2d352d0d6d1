//! Subscription Runtime
//!
//! Wraps the [`SubscriptionBook`] with locking, flush scheduling and inbound
//! demultiplexing, and wires itself to an [`Endpoint`].
//!
//! # Batching
//!
//! Every registration change that leaves deltas in the queue schedules one
//! flush task on the ambient Tokio runtime. The task only drains the queue
//! once a scheduler yield passes without further registrations, so changes
//! issued back-to-back by the caller reach the wire as a single message on
//! both runtime flavors. When the queue grows past `max_queue_size` actions
//! the pending task is aborted and the queue is flushed inline.
//!
//! Outside a runtime nothing is scheduled: the batch stays queued until
//! [`Subscriptions::flush`] is called or the threshold is crossed.
//!
//! # Locking
//!
//! Neither the book lock nor any flush state lock is held while calling the
//! endpoint or a listener, so listeners may subscribe or unsubscribe from
//! inside their callback, even when the endpoint delivers frames from within
//! `update_subscriptions`. A flush requested while another one is sending is
//! folded into the active flusher, which keeps messages in queue order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::application::ports::Endpoint;
use crate::application::services::FeedError;
use crate::domain::events::{Event, EventType};
use crate::domain::state::{FeedState, FeedStateChange};
use crate::domain::subscription::{
    ListenerId, SubscriptionBook, SubscriptionKind, SubscriptionStats,
};
use crate::domain::wire::{DataFrame, FrameHead, decode_events};
use crate::infrastructure::metrics::{self, DropReason};

/// Default number of queued actions that forces an immediate flush.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 200;

/// Scheduler yields a flush task waits for a quiet queue before sending anyway.
const MAX_SETTLE_ROUNDS: u32 = 64;

/// Event callback shared between the registry and in-flight dispatch.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

// =============================================================================
// Subscriptions
// =============================================================================

/// Listener registry bound to an endpoint.
///
/// Cloning is cheap and yields another handle to the same registry.
#[derive(Clone)]
pub struct Subscriptions {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Arc<dyn Endpoint>,
    book: Mutex<SubscriptionBook<Listener>>,
    schemas: Mutex<HashMap<EventType, Vec<String>>>,
    state: watch::Sender<FeedState>,
    flushing: Mutex<FlushState>,
    pending_flush: Mutex<Option<AbortHandle>>,
    revision: AtomicU64,
    max_queue_size: usize,
}

#[derive(Debug, Default)]
struct FlushState {
    active: bool,
    rerun: bool,
}

/// Releases the flusher role when the endpoint panics mid-send.
struct ActiveFlush<'a>(&'a Mutex<FlushState>);

impl Drop for ActiveFlush<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *self.0.lock() = FlushState::default();
        }
    }
}

impl Subscriptions {
    /// Create a registry and register its handlers on `endpoint`.
    #[must_use]
    pub fn new(endpoint: Arc<dyn Endpoint>, max_queue_size: usize) -> Self {
        let (state, _) = watch::channel(FeedState::default());

        let inner = Arc::new(Inner {
            endpoint: Arc::clone(&endpoint),
            book: Mutex::new(SubscriptionBook::new()),
            schemas: Mutex::new(HashMap::new()),
            state,
            flushing: Mutex::new(FlushState::default()),
            pending_flush: Mutex::new(None),
            revision: AtomicU64::new(0),
            max_queue_size,
        });

        let weak = Arc::downgrade(&inner);
        endpoint.register_state_change_handler(Arc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.change_state(&change);
            }
        }));

        let weak = Arc::downgrade(&inner);
        endpoint.register_data_change_handler(Arc::new(move |frame, time_series| {
            if let Some(inner) = weak.upgrade() {
                inner.on_data(frame, time_series);
            }
        }));

        Self { inner }
    }

    /// Register `listener` for every `(type, symbol)` pair.
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
        let listener: Listener = Arc::new(listener);
        let id = self.inner.book.lock().subscribe(event_types, symbols, listener);

        tracing::debug!(
            listener_id = id,
            event_types = event_types.len(),
            symbols = symbols.len(),
            "Listener subscribed"
        );

        self.inner.after_change();
        SubscriptionHandle::new(&self.inner, id, SubscriptionKind::Live, event_types, symbols)
    }

    /// Register a time-series `listener` for every `(type, symbol)` pair.
    ///
    /// Events older than `from_time` are filtered out before reaching the
    /// listener, since the server streams from the lowest watermark requested
    /// by any listener of the key. Events without a `time` field pass.
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
        let filtered: Listener = Arc::new(move |event: &Event| {
            if let (Some(from_time), Some(time)) = (from_time, event.time()) {
                if time < from_time {
                    return;
                }
            }
            listener(event);
        });

        let id = self
            .inner
            .book
            .lock()
            .subscribe_time_series(event_types, symbols, from_time, filtered);

        tracing::debug!(
            listener_id = id,
            event_types = event_types.len(),
            symbols = symbols.len(),
            from_time,
            "Time series listener subscribed"
        );

        self.inner.after_change();
        SubscriptionHandle::new(
            &self.inner,
            id,
            SubscriptionKind::TimeSeries,
            event_types,
            symbols,
        )
    }

    /// Send the pending batch now.
    ///
    /// This is the turn boundary when no Tokio runtime is running. Called
    /// while another flush is sending, it returns immediately and the active
    /// flush picks up the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint rejects the message; the batch is
    /// dropped in that case.
    pub fn flush(&self) -> Result<(), FeedError> {
        self.inner.cancel_scheduled_flush();
        self.inner.flush()
    }

    /// Apply a partial state change as if it came from the endpoint.
    pub fn change_state(&self, change: &FeedStateChange) {
        self.inner.change_state(change);
    }

    /// Demultiplex a data frame as if it came from the endpoint.
    pub fn on_data(&self, frame: DataFrame, time_series: bool) {
        self.inner.on_data(frame, time_series);
    }

    /// Current feed state.
    #[must_use]
    pub fn state(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    /// Watch every subsequent state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.inner.book.lock().stats()
    }

    /// The endpoint this registry is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.inner.endpoint
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("stats", &self.stats())
            .field("max_queue_size", &self.inner.max_queue_size)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Runtime Internals
// =============================================================================

impl Inner {
    fn after_change(self: &Arc<Self>) {
        let (idle, count) = {
            let book = self.book.lock();
            (book.queue().is_idle(), book.queue().count)
        };

        if count > self.max_queue_size {
            tracing::debug!(count, "Subscription queue over threshold, flushing inline");
            self.cancel_scheduled_flush();
            if let Err(err) = self.flush() {
                tracing::warn!(error = %err, "Forced subscription flush failed");
            }
        } else if !idle {
            self.schedule_flush();
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        self.revision.fetch_add(1, Ordering::AcqRel);

        let mut pending = self.pending_flush.lock();
        if pending.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::trace!("No runtime, batch waits for an explicit flush");
            return;
        };

        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let mut rounds = 0;
            loop {
                let Some(seen) = weak.upgrade().map(|inner| inner.revision.load(Ordering::Acquire))
                else {
                    return;
                };
                tokio::task::yield_now().await;
                rounds += 1;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.revision.load(Ordering::Acquire) == seen || rounds >= MAX_SETTLE_ROUNDS {
                    break;
                }
            }

            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.pending_flush.lock().take();

            if let Err(err) = inner.flush() {
                tracing::warn!(error = %err, "Scheduled subscription flush failed, batch dropped");
            }
        });

        *pending = Some(task.abort_handle());
    }

    fn cancel_scheduled_flush(&self) {
        if let Some(task) = self.pending_flush.lock().take() {
            task.abort();
        }
    }

    fn flush(&self) -> Result<(), FeedError> {
        {
            let mut state = self.flushing.lock();
            if state.active {
                state.rerun = true;
                return Ok(());
            }
            state.active = true;
        }
        let _active = ActiveFlush(&self.flushing);

        let mut result = Ok(());
        loop {
            if let Err(err) = self.send_pending() {
                if result.is_ok() {
                    result = Err(err);
                } else {
                    tracing::warn!(error = %err, "Subscription flush failed, batch dropped");
                }
            }

            let mut state = self.flushing.lock();
            if !state.rerun {
                state.active = false;
                break;
            }
            state.rerun = false;
        }

        result
    }

    fn send_pending(&self) -> Result<(), FeedError> {
        let (message, stats) = {
            let mut book = self.book.lock();
            (book.take_message(), book.stats())
        };
        metrics::set_subscriptions(stats.live_keys, stats.time_series_keys);

        let Some(message) = message else {
            return Ok(());
        };

        tracing::debug!(
            reset = message.reset,
            add = message.add.len(),
            remove = message.remove.len(),
            add_time_series = message.add_time_series.len(),
            remove_time_series = message.remove_time_series.len(),
            "Sending subscription update"
        );

        self.endpoint.update_subscriptions(&message)?;
        metrics::record_message_sent(&message);
        Ok(())
    }

    fn change_state(self: &Arc<Self>, change: &FeedStateChange) {
        match change.connected {
            Some(true) => {
                tracing::info!("Feed connected, re-sending subscriptions");
                self.book.lock().request_reset();
                self.schedule_flush();
            }
            Some(false) => tracing::info!("Feed disconnected"),
            None => {}
        }

        self.state.send_modify(|state| state.apply(change));
    }

    fn on_data(&self, frame: DataFrame, time_series: bool) {
        let Ok(event_type) = frame.head.event_type_name().parse::<EventType>() else {
            tracing::debug!(event_type = frame.head.event_type_name(), "Dropping frame of unknown type");
            metrics::record_frame_dropped(DropReason::UnknownEventType);
            return;
        };

        let schema = match frame.head {
            FrameHead::Schema(_, fields) => {
                self.schemas.lock().insert(event_type, fields.clone());
                fields
            }
            FrameHead::Type(_) => {
                let known = self.schemas.lock().get(&event_type).cloned();
                let Some(fields) = known else {
                    tracing::debug!(%event_type, "Dropping frame without known schema");
                    metrics::record_frame_dropped(DropReason::MissingSchema);
                    return;
                };
                fields
            }
        };

        if schema.is_empty() {
            tracing::debug!(%event_type, "Dropping frame with empty schema");
            metrics::record_frame_dropped(DropReason::EmptySchema);
            return;
        }

        let kind = if time_series {
            SubscriptionKind::TimeSeries
        } else {
            SubscriptionKind::Live
        };

        let mut dispatched = 0_u64;
        for event in decode_events(event_type, &schema, &frame.body) {
            let listeners = self
                .book
                .lock()
                .listeners(kind, event.event_type, &event.event_symbol);

            let Some(listeners) = listeners else {
                continue;
            };

            for listener in listeners {
                listener(&event);
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            metrics::record_events_dispatched(dispatched);
        }
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Registration returned by `subscribe*`.
///
/// Dropping the handle keeps the registration alive; call
/// [`SubscriptionHandle::unsubscribe`] to release it.
#[derive(Debug)]
#[must_use = "the subscription stays active until unsubscribe() is called"]
pub struct SubscriptionHandle {
    inner: Weak<Inner>,
    id: ListenerId,
    kind: SubscriptionKind,
    event_types: Vec<EventType>,
    symbols: Vec<String>,
    active: AtomicBool,
}

impl SubscriptionHandle {
    fn new<S: AsRef<str>>(
        inner: &Arc<Inner>,
        id: ListenerId,
        kind: SubscriptionKind,
        event_types: &[EventType],
        symbols: &[S],
    ) -> Self {
        Self {
            inner: Arc::downgrade(inner),
            id,
            kind,
            event_types: event_types.to_vec(),
            symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
            active: AtomicBool::new(true),
        }
    }

    /// Listener identifier of this registration.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether [`SubscriptionHandle::unsubscribe`] has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove this listener from every key it was registered under.
    ///
    /// Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        {
            let mut book = inner.book.lock();
            match self.kind {
                SubscriptionKind::Live => {
                    book.unsubscribe(self.id, &self.event_types, &self.symbols);
                }
                SubscriptionKind::TimeSeries => {
                    book.unsubscribe_time_series(self.id, &self.event_types, &self.symbols);
                }
            }
        }

        tracing::debug!(listener_id = self.id, "Listener unsubscribed");
        inner.after_change();
    }
}

// =============================================================================
// Tests
// =============================================================================
