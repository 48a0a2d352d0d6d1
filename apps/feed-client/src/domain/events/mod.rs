//! Market Data Event Types
//!
//! Core domain types for decoded feed events. The field set of an event is
//! open: it is determined at runtime by the schema the server announces for
//! its event type, so fields are kept in an ordered name → value map while
//! the routing keys (`eventType`, `eventSymbol`) are promoted to typed fields.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Field carrying the instrument symbol inside a wire record.
pub const EVENT_SYMBOL_FIELD: &str = "eventSymbol";

/// Field carrying the event type inside a wire record.
pub const EVENT_TYPE_FIELD: &str = "eventType";

/// Unique, sortable record identifier within a time series.
pub const INDEX_FIELD: &str = "index";

/// Event timestamp in epoch milliseconds.
pub const TIME_FIELD: &str = "time";

/// Bitmask of transaction/snapshot flags.
pub const EVENT_FLAGS_FIELD: &str = "eventFlags";

// =============================================================================
// Event Type
// =============================================================================

/// Kind of market data event. First-level key of every subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Best bid/offer quote.
    Quote,
    /// OHLCV candle (time series).
    Candle,
    /// Last trade.
    Trade,
    /// Daily summary.
    Summary,
    /// Instrument profile.
    Profile,
}

impl EventType {
    /// Get all event types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Quote,
            Self::Candle,
            Self::Trade,
            Self::Summary,
            Self::Profile,
        ]
    }

    /// Get the wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "Quote",
            Self::Candle => "Candle",
            Self::Trade => "Trade",
            Self::Summary => "Summary",
            Self::Profile => "Profile",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a wire name matches no known event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

// =============================================================================
// Field Values
// =============================================================================

/// A single scalar value in a wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integral number (indices, timestamps, sizes, flags).
    Integer(i64),
    /// Floating point number (prices, volumes). Large unsigned values land here too.
    Number(f64),
    /// Text value (symbols, exchange codes, `"NaN"`).
    Text(String),
    /// Missing value.
    Null,
}

impl FieldValue {
    /// Interpret the value as an integer.
    ///
    /// Floats convert only when they carry no fractional part and fit in an
    /// `i64`; numeric text is parsed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        // Both bounds are exact powers of two; the upper one is excluded
        const LOWER: f64 = -9_223_372_036_854_775_808.0;
        const UPPER: f64 = 9_223_372_036_854_775_808.0;

        match self {
            Self::Integer(value) => Some(*value),
            Self::Number(value) if value.fract() == 0.0 && (LOWER..UPPER).contains(value) => {
                Some(*value as i64)
            }
            Self::Text(text) => text.parse().ok(),
            Self::Number(_) | Self::Null => None,
        }
    }

    /// Interpret the value as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.parse().ok(),
            Self::Null => None,
        }
    }

    /// Borrow the value as text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Null => Ok(()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// =============================================================================
// Event
// =============================================================================

/// A decoded market data event.
///
/// Time-series events additionally carry `index`, `time` and `eventFlags`
/// among their fields; see [`Event::index`], [`Event::time`] and
/// [`Event::event_flags`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event kind.
    pub event_type: EventType,
    /// Instrument symbol.
    pub event_symbol: String,
    /// Remaining schema fields in name order.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Event {
    /// Create an event with no fields besides its routing keys.
    #[must_use]
    pub fn new(event_type: EventType, event_symbol: impl Into<String>) -> Self {
        Self {
            event_type,
            event_symbol: event_symbol.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Record identifier within its time series.
    #[must_use]
    pub fn index(&self) -> Option<i64> {
        self.field(INDEX_FIELD).and_then(FieldValue::as_i64)
    }

    /// Event timestamp in epoch milliseconds.
    #[must_use]
    pub fn time(&self) -> Option<i64> {
        self.field(TIME_FIELD).and_then(FieldValue::as_i64)
    }

    /// Raw event flag bits.
    #[must_use]
    pub fn event_flags(&self) -> Option<u32> {
        self.field(EVENT_FLAGS_FIELD)
            .and_then(FieldValue::as_i64)
            .and_then(|bits| u32::try_from(bits).ok())
    }

    /// Overwrite the event flag bits.
    pub fn set_event_flags(&mut self, bits: u32) {
        self.fields
            .insert(EVENT_FLAGS_FIELD.to_string(), FieldValue::Integer(i64::from(bits)));
    }
}

// =============================================================================
// Tests
// =============================================================================
