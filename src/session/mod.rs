//! Per-session analysis: retrain on history, score the current sample, persist it.

mod analyzer;

pub use analyzer::{ModelFactory, SessionAnalyzer};

use crate::features::FeatureVector;
use crate::model::ModelSnapshot;
use crate::risk::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Fewer prior samples than the retrain minimum and no fitted model
    ColdStart,
    /// Enough history; the next analysis fits a model
    Trainable,
    Trained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// No model for this session yet; no score is reported
    ColdStart,
    Scored,
}

/// Outcome of one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub session_id: String,
    pub behavior_id: String,
    pub status: AnalysisStatus,
    /// In [0, 1]; `None` while the session is cold
    pub risk_score: Option<f64>,
    pub level: Option<RiskLevel>,
    /// Score came from the configured fallback because the boundary was zero
    #[serde(default)]
    pub degenerate_boundary: bool,
    pub features: FeatureVector,
    pub model: Option<ModelSnapshot>,
    /// Prior samples seen for this session at analysis time
    pub history_len: usize,
    pub evaluated_at: DateTime<Utc>,
}

impl RiskResult {
    pub fn is_scored(&self) -> bool {
        self.status == AnalysisStatus::Scored
    }
}
