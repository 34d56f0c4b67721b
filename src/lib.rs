//! Behavior risk scoring and device fingerprint matching.
//!
//! Modular structure:
//! - [`telemetry`] — Behavior samples as submitted by clients
//! - [`features`] — Fixed-order 4-dim feature extraction
//! - [`model`] — Outlier model contract and isolation forest
//! - [`risk`] — Score normalization and risk bands
//! - [`session`] — Per-session retrain/score orchestration
//! - [`fingerprint`] — Device fingerprints, user-agent parsing, similarity queries
//! - [`storage`] — Store contract, encrypted SQLite and in-memory stores
//! - [`service`] — Request surface
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod error;
pub mod telemetry;
pub mod features;
pub mod model;
pub mod risk;
pub mod session;
pub mod fingerprint;
pub mod storage;
pub mod service;
pub mod logging;

pub use config::ServiceConfig;
pub use error::{Error, Result, StoreError};
pub use telemetry::BehaviorSample;
pub use features::{FeatureVector, FeatureExtractor};
pub use model::{IsolationForest, OutlierModel};
pub use risk::{RiskLevel, RiskScorer};
pub use session::{RiskResult, SessionAnalyzer};
pub use fingerprint::{DeviceFingerprint, FingerprintMatcher, SimilarityQuery};
pub use storage::{MemoryStore, SecureStore, Store};
pub use service::AnalyticsService;
pub use logging::StructuredLogger;
