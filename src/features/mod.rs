//! Behavioral feature extraction: sample → fixed-order 4-dim vector.

mod behavioral;
mod pipeline;

pub use behavioral::{mean_speed, SpeedStats};
pub use pipeline::FeatureExtractor;

use serde::{Deserialize, Serialize};

/// Dimension names, in vector order. Reordering invalidates every fitted model.
pub const FEATURE_NAMES: [&str; FeatureVector::DIM] = [
    "avg_mouse_speed",
    "typing_speed",
    "session_duration",
    "navigation_count",
];

/// Fixed-size feature vector for model input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub avg_mouse_speed: f64,
    pub typing_speed: f64,
    /// Seconds between capture and evaluation; negative under clock skew
    pub session_duration: f64,
    pub navigation_count: u64,
}

impl FeatureVector {
    pub const DIM: usize = 4;

    pub fn to_array(&self) -> [f64; Self::DIM] {
        [
            self.avg_mouse_speed,
            self.typing_speed,
            self.session_duration,
            self.navigation_count as f64,
        ]
    }

    /// (name, value) pairs in vector order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.to_array())
    }
}
