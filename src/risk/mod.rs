//! Risk normalization: raw model score + decision boundary → bounded risk.

mod engine;

pub use engine::{normalize, RiskLevel, RiskScorer};
