//! Time-Series Aggregator
//!
//! One-shot state machine behind bounded range queries. Events for a single
//! time-series key are fed in arrival order; the aggregator reports
//! [`AggregatorResult::Finished`] once the backward scan has reached the lower
//! bound (or the server snipped it) and no transaction is pending.

use std::collections::BTreeMap;

use crate::domain::event_flags::EventFlags;
use crate::domain::events::Event;

/// Outcome of feeding one event.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorResult {
    /// Keep feeding events.
    Continue,
    /// Range complete; events sorted ascending by `index`, flags cleared.
    Finished(Vec<Event>),
}

/// Accumulates events inside `[from_time, to_time]` keyed by `index`.
#[derive(Debug, Clone)]
pub struct TimeSeriesAggregator {
    from_time: i64,
    to_time: i64,
    events: BTreeMap<i64, Event>,
    complete: bool,
    tx_pending: bool,
}

impl TimeSeriesAggregator {
    /// Create an aggregator for the inclusive range `[from_time, to_time]`.
    #[must_use]
    pub const fn new(from_time: i64, to_time: i64) -> Self {
        Self {
            from_time,
            to_time,
            events: BTreeMap::new(),
            complete: false,
            tx_pending: false,
        }
    }

    /// Whether the lower bound has been reached.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed the next event.
    ///
    /// Events lacking `index`, `time` or `eventFlags` cannot be placed in the
    /// series and are ignored.
    pub fn on_event(&mut self, event: &Event) -> AggregatorResult {
        let (Some(index), Some(time), Some(bits)) = (event.index(), event.time(), event.event_flags())
        else {
            tracing::debug!(symbol = %event.event_symbol, "Ignoring event without series fields");
            return AggregatorResult::Continue;
        };

        let flags = EventFlags::from_bits(bits);
        self.tx_pending = flags.tx_pending;

        if (self.from_time..=self.to_time).contains(&time) {
            if flags.should_be_removed {
                self.events.remove(&index);
            } else {
                let mut stored = event.clone();
                stored.set_event_flags(0);
                self.events.insert(index, stored);
            }
        }

        if time <= self.from_time || flags.snapshot_snip {
            self.complete = true;
        }

        if self.complete && !self.tx_pending {
            AggregatorResult::Finished(std::mem::take(&mut self.events).into_values().collect())
        } else {
            AggregatorResult::Continue
        }
    }
}
