//! Snapshot View
//!
//! Live, ordered materialized view of one indexed time series. Incoming
//! events are buffered while a snapshot is loading or a transaction is
//! pending and only applied once the boundary closes, so observers never see
//! a torn intermediate state.

use std::collections::BTreeMap;

use crate::domain::event_flags::EventFlags;
use crate::domain::events::Event;

/// Flag-driven materialized view `index → event`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotView {
    pending: Vec<Event>,
    loading: bool,
    just_completed: bool,
    tx_pending: bool,
    view: BTreeMap<i64, Event>,
}

impl SnapshotView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot is currently being loaded.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of events buffered but not yet applied.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Current materialized events sorted ascending by `index`.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.view.values().cloned().collect()
    }

    /// Feed the next event.
    ///
    /// Returns the full view whenever applying buffered events changed it.
    pub fn on_event(&mut self, event: Event) -> Option<Vec<Event>> {
        let flags = EventFlags::from_bits(event.event_flags().unwrap_or(0));
        self.tx_pending = flags.tx_pending;

        if flags.snapshot_begin {
            self.pending.clear();
            self.loading = true;
        }

        if self.loading && flags.snapshot_finished() {
            self.loading = false;
            self.just_completed = true;
        }

        self.pending.push(event);

        if self.loading || self.tx_pending {
            return None;
        }

        let mut changed = false;

        if self.just_completed {
            self.just_completed = false;
            if !self.view.is_empty() {
                self.view.clear();
                changed = true;
            }
        }

        for mut event in self.pending.drain(..) {
            let Some(index) = event.index() else {
                tracing::debug!(symbol = %event.event_symbol, "Dropping snapshot event without index");
                continue;
            };

            let flags = EventFlags::from_bits(event.event_flags().unwrap_or(0));
            if flags.should_be_removed {
                changed |= self.view.remove(&index).is_some();
            } else {
                event.set_event_flags(0);
                self.view.insert(index, event);
                changed = true;
            }
        }

        changed.then(|| self.events())
    }
}
