//! Speed statistics over mouse and keyboard event sequences.

use crate::telemetry::EventAttributes;
use serde_json::Value;
use tracing::warn;

const SPEED_KEY: &str = "speed";

/// Per-sequence speed summary. Events without a usable speed count as 0.0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedStats {
    pub events: usize,
    pub sum: f64,
    /// Events whose `speed` was present but not a finite number, or would
    /// push the running sum past `f64` range
    pub malformed: usize,
}

impl SpeedStats {
    pub fn from_events(events: &[EventAttributes]) -> Self {
        let mut s = SpeedStats::default();
        for e in events {
            s.events += 1;
            match e.get(SPEED_KEY) {
                None | Some(Value::Null) => {}
                Some(v) => match speed_value(v).map(|speed| s.sum + speed) {
                    Some(sum) if sum.is_finite() => s.sum = sum,
                    _ => s.malformed += 1,
                },
            }
        }
        s
    }

    pub fn mean(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.sum / self.events as f64
        }
    }
}

fn speed_value(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Arithmetic mean of `speed` across events; `kind` labels malformed-event logs.
pub fn mean_speed(events: &[EventAttributes], kind: &str) -> f64 {
    let stats = SpeedStats::from_events(events);
    if stats.malformed > 0 {
        warn!(
            kind,
            malformed = stats.malformed,
            total = stats.events,
            "malformed speed values treated as 0.0"
        );
    }
    stats.mean()
}
