//! Feed Codec Module
//!
//! JSON encoding and decoding of the payloads exchanged with a feed endpoint,
//! for transport adapters that receive raw text.
//!
//! - **Data frames**: `[head, body]` columnar frames, see [`DataFrame`]
//! - **State changes**: partial `FeedState` objects
//! - **Outgoing**: subscription deltas and on-demand requests
//!
//! Example data frame:
//! ```json
//! [["Candle", ["eventSymbol", "index", "time", "eventFlags"]], ["AAPL{=d}", 6829250544717005000, 1590058800000, 4]]
//! ```

use crate::application::ports::OnDemandMessage;
use crate::domain::state::FeedStateChange;
use crate::domain::wire::{DataFrame, SubscribeMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for feed payloads.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a `[head, body]` data frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array or does not match the
    /// frame shape.
    pub fn decode_frame(&self, text: &str) -> Result<DataFrame, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('[') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array, got: {}...",
                excerpt(trimmed)
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Decode a partial state change object.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object of state fields.
    pub fn decode_state(&self, text: &str) -> Result<FeedStateChange, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                excerpt(trimmed)
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encode a subscription delta.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_subscriptions(&self, message: &SubscribeMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encode an on-demand service request.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_on_demand(&self, message: &OnDemandMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(50).collect()
}

// =============================================================================
// Tests
// =============================================================================
