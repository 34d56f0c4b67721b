//! Client behavior telemetry as submitted per analysis request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One captured interaction event. Only the numeric `speed` key is interpreted,
/// and only for mouse and keyboard events.
pub type EventAttributes = Map<String, Value>;

/// Behavior captured for one session at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSample {
    pub session_id: String,
    #[serde(default)]
    pub mouse_movements: Vec<EventAttributes>,
    #[serde(default)]
    pub keyboard_patterns: Vec<EventAttributes>,
    #[serde(default)]
    pub navigation_patterns: Vec<EventAttributes>,
    /// Capture time; stamped per instance when the client omits it
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl BehaviorSample {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            mouse_movements: Vec::new(),
            keyboard_patterns: Vec::new(),
            navigation_patterns: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn captured_at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    /// Append one mouse-movement event per speed
    pub fn with_mouse_speeds(mut self, speeds: &[f64]) -> Self {
        self.mouse_movements
            .extend(speeds.iter().map(|s| speed_event(*s)));
        self
    }

    /// Append one keyboard event per speed
    pub fn with_typing_speeds(mut self, speeds: &[f64]) -> Self {
        self.keyboard_patterns
            .extend(speeds.iter().map(|s| speed_event(*s)));
        self
    }

    pub fn with_navigation(mut self, events: Vec<EventAttributes>) -> Self {
        self.navigation_patterns.extend(events);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.session_id.trim().is_empty()
    }
}

fn speed_event(speed: f64) -> EventAttributes {
    let mut m = Map::new();
    m.insert("speed".to_string(), Value::from(speed));
    m
}
