//! Wire Shapes
//!
//! Stateless helpers between the subscription tables and the compact wire
//! format exchanged with the endpoint:
//!
//! - Outgoing: [`SubscribeMessage`] deltas rendered from per-type/per-symbol maps
//! - Incoming: [`DataFrame`] columnar frames split into fixed-width records
//!
//! # Incoming Frame Format
//!
//! ```json
//! [["Quote", ["eventSymbol", "bidPrice", "askPrice"]], ["AAPL", 150.0, 150.05, "MSFT", 410.1, 410.2]]
//! ["Quote", ["AAPL", 150.01, 150.05]]
//! ```
//!
//! The head either announces the schema for the type or names the type alone,
//! relying on a schema announced earlier on the same connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::events::{EVENT_SYMBOL_FIELD, EVENT_TYPE_FIELD, Event, EventType, FieldValue};

// =============================================================================
// Series Map
// =============================================================================

/// Two-level ordered map keyed by event type, then by symbol.
///
/// Inner maps are pruned when they become empty so [`SeriesMap::is_empty`]
/// reflects the absence of any key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMap<T> {
    inner: BTreeMap<EventType, BTreeMap<String, T>>,
}

impl<T> Default for SeriesMap<T> {
    fn default() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }
}

impl<T> SeriesMap<T> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for a key.
    pub fn insert(&mut self, event_type: EventType, symbol: &str, value: T) -> Option<T> {
        self.inner
            .entry(event_type)
            .or_default()
            .insert(symbol.to_string(), value)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, event_type: EventType, symbol: &str) -> Option<T> {
        let symbols = self.inner.get_mut(&event_type)?;
        let removed = symbols.remove(symbol);

        if symbols.is_empty() {
            self.inner.remove(&event_type);
        }

        removed
    }

    /// Get the value for a key.
    #[must_use]
    pub fn get(&self, event_type: EventType, symbol: &str) -> Option<&T> {
        self.inner.get(&event_type)?.get(symbol)
    }

    /// Get the value for a key mutably.
    pub fn get_mut(&mut self, event_type: EventType, symbol: &str) -> Option<&mut T> {
        self.inner.get_mut(&event_type)?.get_mut(symbol)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, event_type: EventType, symbol: &str) -> bool {
        self.get(event_type, symbol).is_some()
    }

    /// Check if no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total number of keys across all event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    /// Iterate over `(event type, symbol, value)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (EventType, &str, &T)> {
        self.inner.iter().flat_map(|(event_type, symbols)| {
            symbols
                .iter()
                .map(move |(symbol, value)| (*event_type, symbol.as_str(), value))
        })
    }

    /// Render as `type → [symbol]`, discarding values.
    #[must_use]
    pub fn to_subscription_list(&self) -> SubscriptionList {
        self.inner
            .iter()
            .map(|(event_type, symbols)| (*event_type, symbols.keys().cloned().collect()))
            .collect()
    }
}

impl SeriesMap<Option<i64>> {
    /// Render as `type → [{eventSymbol, fromTime?}]`.
    #[must_use]
    pub fn to_time_series_list(&self) -> TimeSeriesList {
        self.inner
            .iter()
            .map(|(event_type, symbols)| {
                let items = symbols
                    .iter()
                    .map(|(symbol, from_time)| TimeSeriesItem {
                        event_symbol: symbol.clone(),
                        from_time: *from_time,
                    })
                    .collect();
                (*event_type, items)
            })
            .collect()
    }
}

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Symbols per event type.
pub type SubscriptionList = BTreeMap<EventType, Vec<String>>;

/// Time-series subscription items per event type.
pub type TimeSeriesList = BTreeMap<EventType, Vec<TimeSeriesItem>>;

/// A single time-series subscription on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesItem {
    /// Subscribed symbol.
    pub event_symbol: String,
    /// Lower time bound; omitted when no history is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_time: Option<i64>,
}

impl TimeSeriesItem {
    /// Create an item.
    #[must_use]
    pub fn new(event_symbol: impl Into<String>, from_time: Option<i64>) -> Self {
        Self {
            event_symbol: event_symbol.into(),
            from_time,
        }
    }
}

/// Subscription delta sent to the endpoint.
///
/// Only non-empty parts are serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeMessage {
    /// Server must drop all session state and take `add` as the full set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
    /// Live subscriptions to add.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: SubscriptionList,
    /// Live subscriptions to remove.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remove: SubscriptionList,
    /// Time-series subscriptions to add or re-watermark.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_time_series: TimeSeriesList,
    /// Time-series subscriptions to remove.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remove_time_series: SubscriptionList,
}

impl SubscribeMessage {
    /// Check if the message carries nothing worth sending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.reset
            && self.add.is_empty()
            && self.remove.is_empty()
            && self.add_time_series.is_empty()
            && self.remove_time_series.is_empty()
    }
}

// =============================================================================
// Incoming Frames
// =============================================================================

/// Head of an incoming data frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameHead {
    /// Event type only; reuse the schema learned earlier.
    Type(String),
    /// Event type with its field schema.
    Schema(String, Vec<String>),
}

impl FrameHead {
    /// Wire name of the event type.
    #[must_use]
    pub fn event_type_name(&self) -> &str {
        match self {
            Self::Type(name) | Self::Schema(name, _) => name,
        }
    }
}

/// An incoming `[head, body]` data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(FrameHead, Vec<FieldValue>)", into = "(FrameHead, Vec<FieldValue>)")]
pub struct DataFrame {
    /// Type/schema header.
    pub head: FrameHead,
    /// Flat values, a multiple of the schema length.
    pub body: Vec<FieldValue>,
}

impl From<(FrameHead, Vec<FieldValue>)> for DataFrame {
    fn from((head, body): (FrameHead, Vec<FieldValue>)) -> Self {
        Self { head, body }
    }
}

impl From<DataFrame> for (FrameHead, Vec<FieldValue>) {
    fn from(frame: DataFrame) -> Self {
        (frame.head, frame.body)
    }
}

/// Split a flat value array into records of `width` values.
///
/// A trailing partial record is not returned.
pub fn split_chunks<T>(values: &[T], width: usize) -> impl Iterator<Item = &[T]> {
    values.chunks_exact(width.max(1))
}

/// Zip each fixed-width record with the schema's field names.
///
/// The symbol comes from the `eventSymbol` field; a schema without it yields
/// events with an empty symbol, which never match a subscription.
#[must_use]
pub fn decode_events(event_type: EventType, schema: &[String], body: &[FieldValue]) -> Vec<Event> {
    if schema.is_empty() {
        return Vec::new();
    }

    split_chunks(body, schema.len())
        .map(|values| {
            let mut event = Event::new(event_type, String::new());

            for (name, value) in schema.iter().zip(values) {
                match name.as_str() {
                    EVENT_SYMBOL_FIELD => event.event_symbol = value.to_string(),
                    EVENT_TYPE_FIELD => {}
                    _ => {
                        event.fields.insert(name.clone(), value.clone());
                    }
                }
            }

            event
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[&str]) -> Vec<String> {
        fields.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn series_map_prunes_empty_types() {
        let mut map = SeriesMap::new();
        map.insert(EventType::Quote, "AAPL", ());

        assert!(map.remove(EventType::Quote, "AAPL").is_some());
        assert!(map.is_empty());
        assert!(map.remove(EventType::Quote, "AAPL").is_none());
    }

    #[test]
    fn subscription_list_is_sorted_by_symbol() {
        let mut map = SeriesMap::new();
        for symbol in ["4", "1", "3"] {
            map.insert(EventType::Summary, symbol, ());
        }

        let list = map.to_subscription_list();
        assert_eq!(list[&EventType::Summary], vec!["1", "3", "4"]);
    }

    #[test]
    fn time_series_list_omits_missing_from_time() {
        let mut map = SeriesMap::new();
        map.insert(EventType::Candle, "1", None);
        map.insert(EventType::Candle, "2", Some(1000));

        let message = SubscribeMessage {
            add_time_series: map.to_time_series_list(),
            ..SubscribeMessage::default()
        };

        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"addTimeSeries":{"Candle":[{"eventSymbol":"1"},{"eventSymbol":"2","fromTime":1000}]}}"#
        );
    }

    #[test]
    fn empty_message_serializes_to_empty_object() {
        let message = SubscribeMessage::default();
        assert!(message.is_empty());
        assert_eq!(serde_json::to_string(&message).unwrap(), "{}");
    }

    #[test]
    fn reset_alone_is_not_empty() {
        let message = SubscribeMessage {
            reset: true,
            ..SubscribeMessage::default()
        };
        assert!(!message.is_empty());
    }

    #[test]
    fn frame_with_schema_head_deserializes() {
        let frame: DataFrame =
            serde_json::from_str(r#"[["Summary", ["eventSymbol", "eventTime"]], ["AEX.IND:TEI", 0]]"#)
                .unwrap();

        assert_eq!(
            frame.head,
            FrameHead::Schema(
                "Summary".to_string(),
                schema(&["eventSymbol", "eventTime"])
            )
        );
        assert_eq!(frame.body.len(), 2);
    }

    #[test]
    fn frame_with_bare_head_deserializes() {
        let frame: DataFrame = serde_json::from_str(r#"["Quote", ["AAPL", 1.5]]"#).unwrap();
        assert_eq!(frame.head, FrameHead::Type("Quote".to_string()));
        assert_eq!(frame.head.event_type_name(), "Quote");
    }

    #[test]
    fn split_chunks_drops_partial_tail() {
        let values = [1, 2, 3, 4, 5];
        let chunks: Vec<_> = split_chunks(&values, 2).collect();
        assert_eq!(chunks, vec![&[1, 2][..], &[3, 4][..]]);
    }

    #[test]
    fn decode_events_zips_schema_with_values() {
        let body = vec![
            FieldValue::from("AAPL{=15m}"),
            FieldValue::Integer(0),
            FieldValue::Integer(1_590_058_800_000),
            FieldValue::from("MSFT{=15m}"),
            FieldValue::Integer(2),
            FieldValue::Integer(1_590_057_900_000),
        ];

        let events = decode_events(
            EventType::Candle,
            &schema(&["eventSymbol", "eventFlags", "time"]),
            &body,
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_symbol, "AAPL{=15m}");
        assert_eq!(events[0].event_type, EventType::Candle);
        assert_eq!(events[0].time(), Some(1_590_058_800_000));
        assert_eq!(events[1].event_symbol, "MSFT{=15m}");
        assert_eq!(events[1].event_flags(), Some(2));
        assert!(events[1].field("eventSymbol").is_none());
    }

    #[test]
    fn decode_events_with_empty_schema_yields_nothing() {
        let events = decode_events(EventType::Quote, &[], &[FieldValue::Integer(1)]);
        assert!(events.is_empty());
    }
}
