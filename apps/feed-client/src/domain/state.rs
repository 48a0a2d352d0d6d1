//! Feed Connection State
//!
//! Connection and replay status, mutated by partial state-change
//! notifications arriving from the endpoint (or applied optimistically by
//! replay controls).

use serde::{Deserialize, Serialize};

/// Connection/replay status of the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    /// Whether the transport session is established.
    pub connected: bool,
    /// Whether on-demand replay is available; `None` until the server says.
    pub replay_supported: Option<bool>,
    /// Whether a replay is running.
    pub replay: bool,
    /// Whether the replay buffer was cleared.
    pub clear: bool,
    /// Replay clock, epoch milliseconds.
    pub time: i64,
    /// Replay speed multiplier.
    pub speed: f64,
}

impl FeedState {
    /// Apply a partial update; absent fields keep their value.
    pub fn apply(&mut self, change: &FeedStateChange) {
        if let Some(connected) = change.connected {
            self.connected = connected;
        }
        if let Some(replay_supported) = change.replay_supported {
            self.replay_supported = Some(replay_supported);
        }
        if let Some(replay) = change.replay {
            self.replay = replay;
        }
        if let Some(clear) = change.clear {
            self.clear = clear;
        }
        if let Some(time) = change.time {
            self.time = time;
        }
        if let Some(speed) = change.speed {
            self.speed = speed;
        }
    }
}

/// A partial [`FeedState`] record. Any subset of fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStateChange {
    /// New connection flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    /// New replay capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_supported: Option<bool>,
    /// New replay flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<bool>,
    /// New clear flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
    /// New replay clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    /// New replay speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl FeedStateChange {
    /// A change carrying only the connection flag.
    #[must_use]
    pub fn connected(connected: bool) -> Self {
        Self {
            connected: Some(connected),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_change_keeps_other_fields() {
        let mut state = FeedState {
            connected: true,
            speed: 2.0,
            ..FeedState::default()
        };

        state.apply(&FeedStateChange {
            replay: Some(true),
            time: Some(1_690_000_000_000),
            ..FeedStateChange::default()
        });

        assert!(state.connected);
        assert!(state.replay);
        assert_eq!(state.time, 1_690_000_000_000);
        assert!((state.speed - 2.0).abs() < f64::EPSILON);
        assert_eq!(state.replay_supported, None);
    }

    #[test]
    fn change_deserializes_from_partial_json() {
        let change: FeedStateChange =
            serde_json::from_str(r#"{"connected":true,"replaySupported":false}"#).unwrap();

        assert_eq!(change.connected, Some(true));
        assert_eq!(change.replay_supported, Some(false));
        assert_eq!(change.speed, None);
    }
}
