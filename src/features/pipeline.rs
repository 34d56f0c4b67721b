//! Feature extraction pipeline: behavior sample → speed stats → vector.

use super::{behavioral::mean_speed, FeatureVector};
use crate::telemetry::BehaviorSample;
use chrono::{DateTime, Utc};

/// Stateless extractor. Never fails: unusable event attributes degrade to 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract with `now` as the evaluation instant for `session_duration`.
    pub fn extract_at(&self, sample: &BehaviorSample, now: DateTime<Utc>) -> FeatureVector {
        FeatureVector {
            avg_mouse_speed: mean_speed(&sample.mouse_movements, "mouse"),
            typing_speed: mean_speed(&sample.keyboard_patterns, "keyboard"),
            session_duration: seconds_between(sample.timestamp, now),
            navigation_count: sample.navigation_patterns.len() as u64,
        }
    }

    /// Extract using the wall clock. Rescoring the same sample later yields a longer duration.
    pub fn extract(&self, sample: &BehaviorSample) -> FeatureVector {
        self.extract_at(sample, Utc::now())
    }

    /// Extract a batch against one shared evaluation instant
    pub fn extract_all(&self, samples: &[BehaviorSample], now: DateTime<Utc>) -> Vec<FeatureVector> {
        samples.iter().map(|s| self.extract_at(s, now)).collect()
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let d = to - from;
    match d.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Map;

    #[test]
    fn empty_sample_extracts_zeros() {
        let sample = BehaviorSample::new("s1");
        let v = FeatureExtractor::new().extract(&sample);
        assert_eq!(v.avg_mouse_speed, 0.0);
        assert_eq!(v.typing_speed, 0.0);
        assert!(v.session_duration >= 0.0);
        assert_eq!(v.navigation_count, 0);
    }

    #[test]
    fn speeds_and_navigation_count() {
        let sample = BehaviorSample::new("s1")
            .with_mouse_speeds(&[1.0, 3.0])
            .with_typing_speeds(&[5.0])
            .with_navigation(vec![Map::new(), Map::new(), Map::new()]);
        let v = FeatureExtractor::new().extract(&sample);
        assert_eq!(v.avg_mouse_speed, 2.0);
        assert_eq!(v.typing_speed, 5.0);
        assert_eq!(v.navigation_count, 3);
    }

    #[test]
    fn duration_is_measured_at_evaluation_time() {
        let captured = Utc::now();
        let sample = BehaviorSample::new("s1").captured_at(captured);
        let x = FeatureExtractor::new();
        let early = x.extract_at(&sample, captured + Duration::seconds(10));
        let late = x.extract_at(&sample, captured + Duration::seconds(70));
        assert_eq!(early.session_duration, 10.0);
        assert_eq!(late.session_duration, 70.0);
    }

    #[test]
    fn clock_skew_yields_negative_duration() {
        let captured = Utc::now();
        let sample = BehaviorSample::new("s1").captured_at(captured);
        let v = FeatureExtractor::new().extract_at(&sample, captured - Duration::milliseconds(1500));
        assert_eq!(v.session_duration, -1.5);
    }
}
