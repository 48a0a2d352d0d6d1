//! Subscription Book
//!
//! Domain state for listener registrations and the pending outgoing batch.
//!
//! # Design
//!
//! The book tracks:
//! - Which listeners are registered for each `(event type, symbol)` key
//! - Live keys and time-series keys in separate tables
//! - The effective (minimum) `fromTime` watermark of each time-series key
//! - The queue of not-yet-sent deltas for the current batch window
//!
//! Many listeners may share one key while the server only ever sees one
//! subscription for it. Deltas are coalesced so that churn inside a batch
//! window reaches the wire as its net change.
//!
//! The book performs no I/O and owns no timers; draining the queue into a
//! [`SubscribeMessage`] is left to the caller.

use crate::domain::events::EventType;
use crate::domain::wire::{SeriesMap, SubscribeMessage};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier of one listener registration.
pub type ListenerId = u64;

/// Table an incoming frame is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Latest-value subscriptions.
    Live,
    /// Indexed time-series subscriptions.
    TimeSeries,
}

/// Orders watermarks with "no lower bound" above every concrete time.
const fn watermark_rank(from_time: Option<i64>) -> (bool, i64) {
    match from_time {
        Some(time) => (false, time),
        None => (true, 0),
    }
}

/// Minimum watermark, or `None` when every listener asked for no bound.
fn min_watermark(from_times: impl IntoIterator<Item = Option<i64>>) -> Option<i64> {
    from_times.into_iter().flatten().min()
}

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug)]
struct LiveEntry<L> {
    listeners: Vec<(ListenerId, L)>,
}

#[derive(Debug)]
struct TimeSeriesListener<L> {
    id: ListenerId,
    from_time: Option<i64>,
    listener: L,
}

#[derive(Debug)]
struct TimeSeriesEntry<L> {
    listeners: Vec<TimeSeriesListener<L>>,
    /// Watermark last queued for the server.
    from_time: Option<i64>,
}

// =============================================================================
// Queue
// =============================================================================

/// Pending, unsent subscription deltas.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Queue {
    /// Re-send the full subscription set, superseding all deltas.
    pub reset: bool,
    /// Number of queuing operations since the last drain.
    pub count: usize,
    /// Live keys to add.
    pub add: SeriesMap<()>,
    /// Live keys to remove.
    pub remove: SeriesMap<()>,
    /// Time-series keys to add, with their watermark.
    pub add_time_series: SeriesMap<Option<i64>>,
    /// Time-series keys to remove.
    pub remove_time_series: SeriesMap<()>,
}

impl Queue {
    /// Check whether a drain would produce anything.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.reset
            && self.add.is_empty()
            && self.remove.is_empty()
            && self.add_time_series.is_empty()
            && self.remove_time_series.is_empty()
    }
}

// =============================================================================
// Subscription Book
// =============================================================================

/// Listener registrations plus the pending batch.
///
/// `L` is the listener payload stored per registration; it is cloned out by
/// [`SubscriptionBook::listeners`] so callers can invoke listeners without
/// holding a borrow on the book.
///
/// # Example
///
/// ```rust
/// use feed_client::domain::events::EventType;
/// use feed_client::domain::subscription::SubscriptionBook;
///
/// let mut book = SubscriptionBook::<()>::new();
///
/// let first = book.subscribe(&[EventType::Quote], &["AAPL"], ());
/// let second = book.subscribe(&[EventType::Quote], &["AAPL"], ());
///
/// // One key on the wire no matter how many listeners share it
/// let message = book.take_message().unwrap();
/// assert_eq!(message.add[&EventType::Quote], vec!["AAPL"]);
///
/// // Still held by the second listener - nothing to send
/// book.unsubscribe(first, &[EventType::Quote], &["AAPL"]);
/// assert!(book.take_message().is_none());
///
/// book.unsubscribe(second, &[EventType::Quote], &["AAPL"]);
/// assert_eq!(book.take_message().unwrap().remove[&EventType::Quote], vec!["AAPL"]);
/// ```
#[derive(Debug)]
pub struct SubscriptionBook<L> {
    live: SeriesMap<LiveEntry<L>>,
    time_series: SeriesMap<TimeSeriesEntry<L>>,
    queue: Queue,
    next_id: ListenerId,
}

impl<L> Default for SubscriptionBook<L> {
    fn default() -> Self {
        Self {
            live: SeriesMap::new(),
            time_series: SeriesMap::new(),
            queue: Queue::default(),
            next_id: 1,
        }
    }
}

impl<L: Clone> SubscriptionBook<L> {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // =========================================================================
    // Live Subscriptions
    // =========================================================================

    /// Register `listener` for every `(type, symbol)` pair of the cartesian product.
    ///
    /// A key that gains its first listener is queued for `add`, unless a
    /// `remove` for it is still pending: then the remove is cancelled and the
    /// server keeps its existing subscription untouched. As a consequence the
    /// new listener does not get the server's last-value push for that key.
    pub fn subscribe<S: AsRef<str>>(
        &mut self,
        event_types: &[EventType],
        symbols: &[S],
        listener: L,
    ) -> ListenerId {
        let id = self.allocate_id();

        for &event_type in event_types {
            for symbol in symbols {
                let symbol = symbol.as_ref();

                if let Some(entry) = self.live.get_mut(event_type, symbol) {
                    // Repeated symbol in the same call
                    if !entry.listeners.iter().any(|(listener_id, _)| *listener_id == id) {
                        entry.listeners.push((id, listener.clone()));
                    }
                    continue;
                }

                self.live.insert(
                    event_type,
                    symbol,
                    LiveEntry {
                        listeners: vec![(id, listener.clone())],
                    },
                );

                if self.queue.remove.remove(event_type, symbol).is_some() {
                    tracing::debug!(%event_type, symbol, "Pending remove cancelled by resubscribe");
                } else {
                    self.queue.add.insert(event_type, symbol, ());
                    self.queue.count += 1;
                }
            }
        }

        id
    }

    /// Remove listener `id` from every `(type, symbol)` pair.
    ///
    /// A key left without listeners is deleted and queued for `remove`,
    /// unless its `add` was still pending, which is simply cancelled.
    pub fn unsubscribe<S: AsRef<str>>(
        &mut self,
        id: ListenerId,
        event_types: &[EventType],
        symbols: &[S],
    ) {
        for &event_type in event_types {
            for symbol in symbols {
                let symbol = symbol.as_ref();

                let Some(entry) = self.live.get_mut(event_type, symbol) else {
                    continue;
                };

                entry.listeners.retain(|(listener_id, _)| *listener_id != id);
                if !entry.listeners.is_empty() {
                    continue;
                }

                self.live.remove(event_type, symbol);

                if self.queue.add.remove(event_type, symbol).is_some() {
                    tracing::debug!(%event_type, symbol, "Pending add cancelled by unsubscribe");
                } else {
                    self.queue.remove.insert(event_type, symbol, ());
                    self.queue.count += 1;
                }
            }
        }
    }

    // =========================================================================
    // Time-Series Subscriptions
    // =========================================================================

    /// Register a time-series `listener` with watermark `from_time`.
    ///
    /// Lowering a key's effective watermark (or creating the key) queues an
    /// `addTimeSeries` so the server re-streams from further back. Raising is
    /// never sent: existing listeners filter unwanted events locally.
    pub fn subscribe_time_series<S: AsRef<str>>(
        &mut self,
        event_types: &[EventType],
        symbols: &[S],
        from_time: Option<i64>,
        listener: L,
    ) -> ListenerId {
        let id = self.allocate_id();

        for &event_type in event_types {
            for symbol in symbols {
                let symbol = symbol.as_ref();
                let registration = TimeSeriesListener {
                    id,
                    from_time,
                    listener: listener.clone(),
                };

                let lowered = match self.time_series.get_mut(event_type, symbol) {
                    Some(entry) if entry.listeners.iter().any(|known| known.id == id) => false,
                    Some(entry) => {
                        entry.listeners.push(registration);
                        // Equal watermarks re-send too (simultaneous subscribers)
                        if watermark_rank(from_time) <= watermark_rank(entry.from_time) {
                            entry.from_time = from_time;
                            true
                        } else {
                            false
                        }
                    }
                    None => {
                        self.time_series.insert(
                            event_type,
                            symbol,
                            TimeSeriesEntry {
                                listeners: vec![registration],
                                from_time,
                            },
                        );
                        true
                    }
                };

                self.queue.remove_time_series.remove(event_type, symbol);

                if lowered {
                    self.queue
                        .add_time_series
                        .insert(event_type, symbol, from_time);
                    self.queue.count += 1;
                }
            }
        }

        id
    }

    /// Remove time-series listener `id` from every `(type, symbol)` pair.
    ///
    /// Remaining listeners get the key re-watermarked to their minimum when it
    /// changed; a key left without listeners is queued for `removeTimeSeries`.
    pub fn unsubscribe_time_series<S: AsRef<str>>(
        &mut self,
        id: ListenerId,
        event_types: &[EventType],
        symbols: &[S],
    ) {
        for &event_type in event_types {
            for symbol in symbols {
                let symbol = symbol.as_ref();

                let Some(entry) = self.time_series.get_mut(event_type, symbol) else {
                    continue;
                };

                entry.listeners.retain(|registration| registration.id != id);

                if entry.listeners.is_empty() {
                    self.time_series.remove(event_type, symbol);
                    self.queue.add_time_series.remove(event_type, symbol);
                    self.queue
                        .remove_time_series
                        .insert(event_type, symbol, ());
                    self.queue.count += 1;
                    continue;
                }

                let from_time = min_watermark(entry.listeners.iter().map(|r| r.from_time));
                if from_time != entry.from_time {
                    entry.from_time = from_time;
                    self.queue
                        .add_time_series
                        .insert(event_type, symbol, from_time);
                    self.queue.count += 1;
                }
            }
        }
    }

    // =========================================================================
    // Batch
    // =========================================================================

    /// Mark the batch as a full re-send (after a fresh connection).
    pub const fn request_reset(&mut self) {
        self.queue.reset = true;
    }

    /// Pending batch.
    #[must_use]
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Drain the pending batch into a message.
    ///
    /// A reset renders the whole current subscription set as `add` and
    /// discards the incremental deltas. Returns `None` when nothing would be
    /// sent.
    pub fn take_message(&mut self) -> Option<SubscribeMessage> {
        let queue = std::mem::take(&mut self.queue);

        let message = if queue.reset {
            SubscribeMessage {
                reset: true,
                add: self.live.to_subscription_list(),
                add_time_series: self.effective_watermarks().to_time_series_list(),
                ..SubscribeMessage::default()
            }
        } else {
            SubscribeMessage {
                reset: false,
                add: queue.add.to_subscription_list(),
                remove: queue.remove.to_subscription_list(),
                add_time_series: queue.add_time_series.to_time_series_list(),
                remove_time_series: queue.remove_time_series.to_subscription_list(),
            }
        };

        (!message.is_empty()).then_some(message)
    }

    fn effective_watermarks(&self) -> SeriesMap<Option<i64>> {
        let mut watermarks = SeriesMap::new();
        for (event_type, symbol, entry) in self.time_series.iter() {
            watermarks.insert(event_type, symbol, entry.from_time);
        }
        watermarks
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Listeners registered for a key, in registration order.
    ///
    /// Returns `None` when the key has no entry in the selected table.
    #[must_use]
    pub fn listeners(
        &self,
        kind: SubscriptionKind,
        event_type: EventType,
        symbol: &str,
    ) -> Option<Vec<L>> {
        match kind {
            SubscriptionKind::Live => self.live.get(event_type, symbol).map(|entry| {
                entry
                    .listeners
                    .iter()
                    .map(|(_, listener)| listener.clone())
                    .collect()
            }),
            SubscriptionKind::TimeSeries => {
                self.time_series.get(event_type, symbol).map(|entry| {
                    entry
                        .listeners
                        .iter()
                        .map(|registration| registration.listener.clone())
                        .collect()
                })
            }
        }
    }

    /// Effective watermark of a time-series key.
    #[must_use]
    pub fn time_series_from_time(&self, event_type: EventType, symbol: &str) -> Option<Option<i64>> {
        self.time_series
            .get(event_type, symbol)
            .map(|entry| entry.from_time)
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            live_keys: self.live.len(),
            live_listeners: self.live.iter().map(|(_, _, e)| e.listeners.len()).sum(),
            time_series_keys: self.time_series.len(),
            time_series_listeners: self
                .time_series
                .iter()
                .map(|(_, _, e)| e.listeners.len())
                .sum(),
            pending_actions: self.queue.count,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of live `(type, symbol)` keys.
    pub live_keys: usize,
    /// Number of live listener registrations across keys.
    pub live_listeners: usize,
    /// Number of time-series keys.
    pub time_series_keys: usize,
    /// Number of time-series listener registrations across keys.
    pub time_series_listeners: usize,
    /// Queuing operations since the last drain.
    pub pending_actions: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::wire::TimeSeriesItem;

    const SUMMARY: EventType = EventType::Summary;
    const CANDLE: EventType = EventType::Candle;

    fn book() -> SubscriptionBook<()> {
        SubscriptionBook::new()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn overlapping_subscriptions_send_one_add() {
        let mut book = book();

        let first = book.subscribe(&[SUMMARY], &["1", "2", "3", "4"], ());
        let second = book.subscribe(&[SUMMARY], &["2", "3"], ());

        let message = book.take_message().unwrap();
        assert_eq!(message.add[&SUMMARY], symbols(&["1", "2", "3", "4"]));
        assert!(message.remove.is_empty());

        book.unsubscribe(second, &[SUMMARY], &["2", "3"]);
        assert!(book.take_message().is_none());

        book.unsubscribe(first, &[SUMMARY], &["1", "2", "3", "4"]);
        let message = book.take_message().unwrap();
        assert_eq!(message.remove[&SUMMARY], symbols(&["1", "2", "3", "4"]));
        assert!(message.add.is_empty());
    }

    #[test]
    fn churn_in_one_window_nets_out() {
        let mut book = book();
        let ids: Vec<_> = ["1", "2", "3", "4"]
            .iter()
            .map(|symbol| book.subscribe(&[SUMMARY], &[*symbol], ()))
            .collect();
        book.take_message();

        for (id, symbol) in ids.iter().zip(["1", "2", "3", "4"]) {
            book.unsubscribe(*id, &[SUMMARY], &[symbol]);
        }
        for symbol in ["2", "3", "5"] {
            book.subscribe(&[SUMMARY], &[symbol], ());
        }

        let message = book.take_message().unwrap();
        assert_eq!(message.remove[&SUMMARY], symbols(&["1", "4"]));
        assert_eq!(message.add[&SUMMARY], symbols(&["5"]));
    }

    #[test]
    fn unsubscribe_then_resubscribe_is_silent() {
        let mut book = book();
        let id = book.subscribe(&[SUMMARY], &["AAPL"], ());
        book.take_message();

        book.unsubscribe(id, &[SUMMARY], &["AAPL"]);
        book.subscribe(&[SUMMARY], &["AAPL"], ());

        assert!(book.take_message().is_none());
        assert_eq!(book.stats().live_keys, 1);
    }

    #[test]
    fn subscribe_then_unsubscribe_before_flush_is_silent() {
        let mut book = book();
        let id = book.subscribe(&[SUMMARY], &["AAPL"], ());
        book.unsubscribe(id, &[SUMMARY], &["AAPL"]);

        assert!(book.take_message().is_none());
    }

    #[test]
    fn repeated_symbol_registers_listener_once() {
        let mut book = book();
        let id = book.subscribe(&[SUMMARY], &["AAPL", "AAPL"], ());

        let listeners = book.listeners(SubscriptionKind::Live, SUMMARY, "AAPL").unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(book.stats().live_listeners, 1);
        assert_eq!(book.stats().pending_actions, 1);

        book.unsubscribe(id, &[SUMMARY], &["AAPL", "AAPL"]);
        assert!(book.take_message().is_none());
    }

    #[test]
    fn repeated_time_series_symbol_queues_once() {
        let mut book = book();
        book.subscribe_time_series(&[CANDLE], &["AAPL{=d}", "AAPL{=d}"], Some(100), ());

        assert_eq!(book.stats().time_series_listeners, 1);
        assert_eq!(book.stats().pending_actions, 1);

        let message = book.take_message().unwrap();
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![TimeSeriesItem::new("AAPL{=d}", Some(100))]
        );
    }

    #[test]
    fn separate_windows_send_remove_then_add() {
        let mut book = book();
        let id = book.subscribe(&[SUMMARY], &["1", "2"], ());
        book.take_message();

        book.unsubscribe(id, &[SUMMARY], &["1", "2"]);
        let message = book.take_message().unwrap();
        assert_eq!(message.remove[&SUMMARY], symbols(&["1", "2"]));

        book.subscribe(&[SUMMARY], &["2"], ());
        let message = book.take_message().unwrap();
        assert_eq!(message.add[&SUMMARY], symbols(&["2"]));
        assert!(message.remove.is_empty());
    }

    #[test]
    fn unknown_listener_unsubscribe_is_ignored() {
        let mut book = book();
        book.subscribe(&[SUMMARY], &["AAPL"], ());
        book.take_message();

        book.unsubscribe(999, &[SUMMARY], &["AAPL", "MSFT"]);

        assert!(book.take_message().is_none());
        assert_eq!(book.stats().live_listeners, 1);
    }

    #[test]
    fn cartesian_product_of_types_and_symbols() {
        let mut book = book();
        book.subscribe(&[EventType::Quote, EventType::Trade], &["AAPL", "MSFT"], ());

        let message = book.take_message().unwrap();
        assert_eq!(message.add[&EventType::Quote], symbols(&["AAPL", "MSFT"]));
        assert_eq!(message.add[&EventType::Trade], symbols(&["AAPL", "MSFT"]));
        assert_eq!(book.stats().live_keys, 4);
    }

    #[test]
    fn time_series_watermarks_follow_minimum() {
        let mut book = book();

        let first = book.subscribe_time_series(&[CANDLE], &["1", "2"], None, ());
        let second = book.subscribe_time_series(&[CANDLE], &["2", "3", "4", "5"], Some(1000), ());
        let third = book.subscribe_time_series(&[CANDLE], &["3", "4"], Some(10), ());

        let message = book.take_message().unwrap();
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![
                TimeSeriesItem::new("1", None),
                TimeSeriesItem::new("2", Some(1000)),
                TimeSeriesItem::new("3", Some(10)),
                TimeSeriesItem::new("4", Some(10)),
                TimeSeriesItem::new("5", Some(1000)),
            ]
        );

        book.unsubscribe_time_series(third, &[CANDLE], &["3", "4"]);
        let message = book.take_message().unwrap();
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![
                TimeSeriesItem::new("3", Some(1000)),
                TimeSeriesItem::new("4", Some(1000)),
            ]
        );
        assert!(message.remove_time_series.is_empty());

        book.unsubscribe_time_series(second, &[CANDLE], &["2", "3", "4", "5"]);
        let message = book.take_message().unwrap();
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![TimeSeriesItem::new("2", None)]
        );
        assert_eq!(message.remove_time_series[&CANDLE], symbols(&["3", "4", "5"]));

        book.unsubscribe_time_series(first, &[CANDLE], &["1", "2"]);
        let message = book.take_message().unwrap();
        assert!(message.add_time_series.is_empty());
        assert_eq!(message.remove_time_series[&CANDLE], symbols(&["1", "2"]));
    }

    #[test]
    fn raising_watermark_is_not_sent() {
        let mut book = book();
        book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(100), ());
        book.take_message();

        book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(500), ());

        assert!(book.take_message().is_none());
        assert_eq!(book.time_series_from_time(CANDLE, "AAPL"), Some(Some(100)));
    }

    #[test]
    fn equal_watermark_is_sent_again() {
        let mut book = book();
        book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(100), ());
        book.take_message();

        book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(100), ());

        let message = book.take_message().unwrap();
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![TimeSeriesItem::new("AAPL", Some(100))]
        );
    }

    #[test]
    fn resubscribe_time_series_cancels_pending_remove() {
        let mut book = book();
        let id = book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(100), ());
        book.take_message();

        book.unsubscribe_time_series(id, &[CANDLE], &["AAPL"]);
        book.subscribe_time_series(&[CANDLE], &["AAPL"], Some(200), ());

        let message = book.take_message().unwrap();
        assert!(message.remove_time_series.is_empty());
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![TimeSeriesItem::new("AAPL", Some(200))]
        );
    }

    #[test]
    fn reset_resends_everything_and_drops_removes() {
        let mut book = book();
        book.subscribe(&[SUMMARY], &["1"], ());
        let gone = book.subscribe(&[SUMMARY], &["2"], ());
        book.subscribe_time_series(&[CANDLE], &["C"], Some(5), ());
        book.take_message();

        book.unsubscribe(gone, &[SUMMARY], &["2"]);
        book.request_reset();

        let message = book.take_message().unwrap();
        assert!(message.reset);
        assert_eq!(message.add[&SUMMARY], symbols(&["1"]));
        assert!(message.remove.is_empty());
        assert_eq!(
            message.add_time_series[&CANDLE],
            vec![TimeSeriesItem::new("C", Some(5))]
        );
        assert!(message.remove_time_series.is_empty());
    }

    #[test]
    fn reset_with_no_subscriptions_still_sends_reset() {
        let mut book = book();
        book.request_reset();

        let message = book.take_message().unwrap();
        assert!(message.reset);
        assert!(message.add.is_empty());
    }

    #[test]
    fn queue_counts_actions_and_drains() {
        let mut book = book();
        book.subscribe(&[SUMMARY], &["1", "2", "3"], ());
        assert_eq!(book.queue().count, 3);

        book.take_message();
        assert_eq!(book.queue().count, 0);
        assert!(book.queue().is_idle());
    }

    #[test]
    fn listeners_are_routed_per_table() {
        let mut book = SubscriptionBook::<&'static str>::new();
        book.subscribe(&[SUMMARY], &["AAPL"], "live");
        book.subscribe_time_series(&[SUMMARY], &["AAPL"], None, "series");

        assert_eq!(
            book.listeners(SubscriptionKind::Live, SUMMARY, "AAPL"),
            Some(vec!["live"])
        );
        assert_eq!(
            book.listeners(SubscriptionKind::TimeSeries, SUMMARY, "AAPL"),
            Some(vec!["series"])
        );
        assert_eq!(book.listeners(SubscriptionKind::Live, SUMMARY, "MSFT"), None);
        assert_eq!(book.listeners(SubscriptionKind::TimeSeries, CANDLE, "AAPL"), None);
    }

    proptest! {
        #[test]
        fn effective_watermark_is_minimum_of_registered(
            from_times in proptest::collection::vec(proptest::option::of(0_i64..10_000), 1..12),
            removals in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let mut book = book();
            let ids: Vec<_> = from_times
                .iter()
                .map(|from_time| book.subscribe_time_series(&[CANDLE], &["X"], *from_time, ()))
                .collect();

            let mut remaining = Vec::new();
            for ((id, from_time), remove) in ids.iter().zip(&from_times).zip(&removals) {
                if *remove {
                    book.unsubscribe_time_series(*id, &[CANDLE], &["X"]);
                } else {
                    remaining.push(*from_time);
                }
            }

            if remaining.is_empty() {
                prop_assert_eq!(book.time_series_from_time(CANDLE, "X"), None);
            } else {
                prop_assert_eq!(
                    book.time_series_from_time(CANDLE, "X"),
                    Some(min_watermark(remaining))
                );
            }
        }
    }
}
