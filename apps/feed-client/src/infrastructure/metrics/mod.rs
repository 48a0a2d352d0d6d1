//! Feed Metrics Module
//!
//! Records client-side feed metrics through the `metrics` facade. The library
//! installs no recorder; a host application that installs one (Prometheus or
//! otherwise) gets these series for free.
//!
//! # Metrics Categories
//!
//! - **Subscriptions**: Outgoing messages, queued actions, active keys
//! - **Inbound**: Dispatched events and dropped frames

use std::sync::Once;

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::domain::wire::SubscribeMessage;

// =============================================================================
// Metric Registration
// =============================================================================

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
///
/// Safe to call repeatedly; descriptions are registered once.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "feed_subscription_messages_sent_total",
            "Total subscription messages sent to the endpoint"
        );
        describe_counter!(
            "feed_subscription_actions_total",
            "Total subscription keys sent by action"
        );
        describe_counter!(
            "feed_frames_dropped_total",
            "Total inbound frames dropped by reason"
        );
        describe_counter!(
            "feed_events_dispatched_total",
            "Total events delivered to listeners"
        );
        describe_gauge!(
            "feed_live_subscriptions",
            "Number of live subscription keys"
        );
        describe_gauge!(
            "feed_time_series_subscriptions",
            "Number of time-series subscription keys"
        );
    });
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Subscription action label.
#[derive(Debug, Clone, Copy)]
pub enum SubscriptionAction {
    /// Live add.
    Add,
    /// Live remove.
    Remove,
    /// Time-series add.
    AddTimeSeries,
    /// Time-series remove.
    RemoveTimeSeries,
}

impl SubscriptionAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::AddTimeSeries => "add_time_series",
            Self::RemoveTimeSeries => "remove_time_series",
        }
    }
}

/// Reason an inbound frame was dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// The head names no known event type.
    UnknownEventType,
    /// No schema was supplied or learned for the type.
    MissingSchema,
    /// The schema has no fields.
    EmptySchema,
    /// The payload could not be decoded.
    Malformed,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownEventType => "unknown_event_type",
            Self::MissingSchema => "missing_schema",
            Self::EmptySchema => "empty_schema",
            Self::Malformed => "malformed",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a subscription message handed to the endpoint.
pub fn record_message_sent(message: &SubscribeMessage) {
    counter!("feed_subscription_messages_sent_total").increment(1);

    let sections = [
        (SubscriptionAction::Add, message.add.values().map(Vec::len).sum::<usize>()),
        (SubscriptionAction::Remove, message.remove.values().map(Vec::len).sum()),
        (
            SubscriptionAction::AddTimeSeries,
            message.add_time_series.values().map(Vec::len).sum(),
        ),
        (
            SubscriptionAction::RemoveTimeSeries,
            message.remove_time_series.values().map(Vec::len).sum(),
        ),
    ];

    for (action, count) in sections {
        if count > 0 {
            counter!(
                "feed_subscription_actions_total",
                "action" => action.as_str()
            )
            .increment(count as u64);
        }
    }
}

/// Record a dropped inbound frame.
pub fn record_frame_dropped(reason: DropReason) {
    counter!(
        "feed_frames_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record events delivered to listeners.
pub fn record_events_dispatched(count: u64) {
    counter!("feed_events_dispatched_total").increment(count);
}

/// Update the active subscription key gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(live: usize, time_series: usize) {
    gauge!("feed_live_subscriptions").set(live as f64);
    gauge!("feed_time_series_subscriptions").set(time_series as f64);
}

// =============================================================================
// Tests
// =============================================================================
