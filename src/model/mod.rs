//! Outlier models: fit on a session's feature history, score one vector against the fit.

mod isolation;

pub use isolation::IsolationForest;

use crate::error::Result;
use crate::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw model output for one vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// Algorithm-specific; for every model in this crate higher means more typical
    pub raw: f64,
    /// Decision boundary of the current fit; `raw < boundary` is atypical
    pub boundary: f64,
}

/// Audit view of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub algorithm: String,
    pub boundary: f64,
    pub trained_on: usize,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
}

/// Capability contract for an unsupervised outlier detector.
///
/// `fit` always replaces the previous fit. Fitting twice on the same ordered
/// input with the same seed must produce the same boundary.
pub trait OutlierModel: Send + Sync {
    fn fit(&mut self, vectors: &[FeatureVector]) -> Result<()>;

    /// Fails with `ModelNotTrained` before the first successful `fit`.
    fn score(&self, vector: &FeatureVector) -> Result<ModelScore>;

    fn snapshot(&self) -> Option<ModelSnapshot>;

    fn is_trained(&self) -> bool {
        self.snapshot().is_some()
    }
}
