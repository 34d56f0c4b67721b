//! Maps an outlier model's raw score to a [0, 1] risk and a configurable risk band.

use crate::config::RiskConfig;
use crate::error::{Error, Result};
use crate::model::ModelScore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64, config: &RiskConfig) -> Self {
        if score >= config.high_threshold {
            RiskLevel::High
        } else if score >= config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// `clamp(1 - (raw - boundary) / |boundary|, 0, 1)`.
///
/// Expects raw scores where higher means more typical. A zero boundary is
/// `DegenerateBoundary`; non-finite inputs are rejected the same way rather
/// than leaking NaN.
pub fn normalize(raw_score: f64, boundary: f64) -> Result<f64> {
    if boundary == 0.0 || !boundary.is_finite() {
        return Err(Error::DegenerateBoundary);
    }
    let risk = 1.0 - (raw_score - boundary) / boundary.abs();
    if risk.is_nan() {
        return Err(Error::DegenerateBoundary);
    }
    Ok(risk.clamp(0.0, 1.0))
}

pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Normalized risk for a model score. A degenerate boundary yields the configured
    /// fallback (clamped into [0, 1]) and `fallback = true`.
    pub fn risk(&self, score: &ModelScore) -> (f64, bool) {
        match normalize(score.raw, score.boundary) {
            Ok(r) => (r, false),
            Err(_) => {
                tracing::warn!(
                    raw = score.raw,
                    boundary = score.boundary,
                    fallback = self.config.degenerate_fallback,
                    "degenerate decision boundary"
                );
                (self.fallback(), true)
            }
        }
    }

    pub fn level(&self, risk: f64) -> RiskLevel {
        RiskLevel::from_score(risk, &self.config)
    }

    fn fallback(&self) -> f64 {
        let f = self.config.degenerate_fallback;
        if f.is_finite() {
            f.clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}
