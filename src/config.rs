//! Service configuration. Loaded from a JSON file; missing sections fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data directory (encrypted store). `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Environment variable holding the store encryption secret
    pub store_secret_env: String,
    /// Retraining policy
    pub analyzer: AnalyzerConfig,
    /// Outlier model parameters
    pub model: ModelConfig,
    /// Risk normalization and banding
    pub risk: RiskConfig,
    /// Similar-device lookup
    pub matcher: MatcherConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum prior samples in a session before the model is fit
    pub min_history: usize,
    /// Session models kept in memory; least recently used idle ones are evicted past this
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of isolation trees
    pub num_trees: usize,
    /// Subsample size per tree (capped at the training set size)
    pub sample_size: usize,
    /// Expected share of outliers in training data; sets the decision boundary
    pub contamination: f64,
    /// Seed for tree construction
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Score at or above this is high risk (0.0–1.0)
    pub high_threshold: f64,
    /// Score at or above this is medium risk
    pub medium_threshold: f64,
    /// Score reported when the model's decision boundary is exactly zero
    pub degenerate_fallback: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Maximum number of similar profiles fetched per lookup
    pub similar_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_secret_env: "BEHAVIOR_RISK_SECRET".to_string(),
            analyzer: AnalyzerConfig::default(),
            model: ModelConfig::default(),
            risk: RiskConfig::default(),
            matcher: MatcherConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_history: 5,
            max_sessions: 10_000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            medium_threshold: 0.5,
            degenerate_fallback: 0.5,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { similar_limit: 5 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ServiceConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<ServiceConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }
}
