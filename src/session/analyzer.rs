//! Orchestrates feature extraction, per-session model fitting and risk normalization.
//!
//! Each session owns its model. The registry hands out one lock per session id,
//! held across fetch → fit → score → store, so a session is never fit or scored
//! concurrently while different sessions run in parallel.
//!
//! History is fetched before the current sample is written: retraining only ever
//! sees strictly prior behavior.
//!
//! The registry is bounded by `max_sessions`. Past that, the least recently used
//! sessions with no request in flight lose their model; their next analysis refits
//! from stored history.

use super::{AnalysisStatus, RiskResult, SessionState};
use crate::config::{AnalyzerConfig, ModelConfig, RiskConfig};
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::model::{IsolationForest, OutlierModel};
use crate::risk::RiskScorer;
use crate::storage::Store;
use crate::telemetry::BehaviorSample;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a fresh, untrained model for a newly seen session.
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn OutlierModel> + Send + Sync>;

struct SessionSlot {
    model: Mutex<Box<dyn OutlierModel>>,
    last_used: AtomicU64,
}

type ModelSlot = Arc<SessionSlot>;

pub struct SessionAnalyzer {
    store: Arc<dyn Store>,
    extractor: FeatureExtractor,
    scorer: RiskScorer,
    config: AnalyzerConfig,
    factory: ModelFactory,
    models: DashMap<String, ModelSlot>,
    clock: AtomicU64,
}

impl SessionAnalyzer {
    /// Analyzer with isolation-forest models built from `model`.
    pub fn new(
        store: Arc<dyn Store>,
        config: AnalyzerConfig,
        model: ModelConfig,
        risk: RiskConfig,
    ) -> Self {
        let factory: ModelFactory =
            Arc::new(move || Box::new(IsolationForest::new(model.clone())) as Box<dyn OutlierModel>);
        Self::with_factory(store, config, risk, factory)
    }

    pub fn with_factory(
        store: Arc<dyn Store>,
        config: AnalyzerConfig,
        risk: RiskConfig,
        factory: ModelFactory,
    ) -> Self {
        Self {
            store,
            extractor: FeatureExtractor::new(),
            scorer: RiskScorer::new(risk),
            config,
            factory,
            models: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    fn slot(&self, session_id: &str) -> ModelSlot {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        // Clone the Arc out so the shard lock is released before the session lock is taken.
        let slot = self
            .models
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    model: Mutex::new((self.factory)()),
                    last_used: AtomicU64::new(tick),
                })
            })
            .value()
            .clone();
        slot.last_used.fetch_max(tick, Ordering::Relaxed);
        if self.models.len() > self.config.max_sessions {
            self.evict_idle();
        }
        slot
    }

    /// Drop least recently used models until the registry fits `max_sessions`.
    /// A slot whose Arc is shared belongs to an in-flight request and is skipped.
    fn evict_idle(&self) {
        let mut idle: Vec<(u64, String)> = self
            .models
            .iter()
            .filter(|e| Arc::strong_count(e.value()) == 1)
            .map(|e| (e.value().last_used.load(Ordering::Relaxed), e.key().clone()))
            .collect();
        idle.sort_unstable();

        let excess = self.models.len().saturating_sub(self.config.max_sessions);
        let mut removed = 0;
        for (_, key) in idle {
            if removed >= excess {
                break;
            }
            if self
                .models
                .remove_if(&key, |_, slot| Arc::strong_count(slot) == 1)
                .is_some()
            {
                removed += 1;
            }
        }
        debug!(removed, tracked = self.models.len(), "idle session models evicted");
    }

    pub fn analyze(&self, sample: &BehaviorSample) -> Result<RiskResult> {
        self.analyze_at(sample, Utc::now())
    }

    /// Analyze with `now` as the evaluation instant for every session duration
    /// computed in this request, history included.
    pub fn analyze_at(&self, sample: &BehaviorSample, now: DateTime<Utc>) -> Result<RiskResult> {
        if !sample.is_valid() {
            return Err(Error::InvalidSample);
        }
        let session_id = sample.session_id.as_str();
        let slot = self.slot(session_id);
        let mut model = slot.model.lock();

        let history = self.store.fetch_behavior_history(session_id)?;
        if history.len() >= self.config.min_history {
            let vectors = self.extractor.extract_all(&history, now);
            model.fit(&vectors)?;
            debug!(session_id, samples = vectors.len(), "session model refit");
        }

        let features = self.extractor.extract_at(sample, now);
        let (status, risk_score, degenerate) = match model.score(&features) {
            Ok(score) => {
                let (risk, fallback) = self.scorer.risk(&score);
                (AnalysisStatus::Scored, Some(risk), fallback)
            }
            Err(Error::ModelNotTrained) => (AnalysisStatus::ColdStart, None, false),
            Err(e) => return Err(e),
        };
        let snapshot = model.snapshot();

        let behavior_id = self.store.store_behavior(sample)?;
        drop(model);

        let result = RiskResult {
            session_id: session_id.to_string(),
            behavior_id,
            status,
            risk_score,
            level: risk_score.map(|r| self.scorer.level(r)),
            degenerate_boundary: degenerate,
            features,
            model: snapshot,
            history_len: history.len(),
            evaluated_at: now,
        };
        info!(
            session_id,
            status = ?result.status,
            risk_score = ?result.risk_score,
            history = result.history_len,
            "behavior analyzed"
        );
        Ok(result)
    }

    /// Where `session_id` stands relative to the retrain minimum.
    pub fn session_state(&self, session_id: &str) -> Result<SessionState> {
        let trained = self
            .models
            .get(session_id)
            .map(|slot| slot.value().clone())
            .map(|slot| slot.model.lock().is_trained())
            .unwrap_or(false);
        if trained {
            return Ok(SessionState::Trained);
        }
        let history = self.store.fetch_behavior_history(session_id)?;
        Ok(if history.len() >= self.config.min_history {
            SessionState::Trainable
        } else {
            SessionState::ColdStart
        })
    }

    /// Drop a session's model; the next analysis starts from its stored history.
    pub fn evict(&self, session_id: &str) -> bool {
        self.models.remove(session_id).is_some()
    }

    pub fn tracked_sessions(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::fingerprint::{DeviceFingerprint, ParsedUserAgent, SimilarityQuery};
    use crate::storage::{DeviceProfile, MemoryStore, StoreResult};
    use std::sync::atomic::AtomicBool;

    /// Memory store whose reads or writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        reads_down: AtomicBool,
        writes_down: AtomicBool,
    }

    impl FlakyStore {
        fn check(flag: &AtomicBool) -> StoreResult<()> {
            if flag.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store down".into()));
            }
            Ok(())
        }
    }

    impl Store for FlakyStore {
        fn store_behavior(&self, sample: &BehaviorSample) -> StoreResult<String> {
            Self::check(&self.writes_down)?;
            self.inner.store_behavior(sample)
        }

        fn fetch_behavior_history(&self, session_id: &str) -> StoreResult<Vec<BehaviorSample>> {
            Self::check(&self.reads_down)?;
            self.inner.fetch_behavior_history(session_id)
        }

        fn store_device_profile(
            &self,
            fingerprint: &DeviceFingerprint,
            parsed: &ParsedUserAgent,
        ) -> StoreResult<String> {
            self.inner.store_device_profile(fingerprint, parsed)
        }

        fn update_device_profile(
            &self,
            id: &str,
            fingerprint: &DeviceFingerprint,
            parsed: &ParsedUserAgent,
        ) -> StoreResult<bool> {
            self.inner.update_device_profile(id, fingerprint, parsed)
        }

        fn fetch_device_profile(&self, id: &str) -> StoreResult<Option<DeviceProfile>> {
            self.inner.fetch_device_profile(id)
        }

        fn find_profile_by_session(&self, session_id: &str) -> StoreResult<Option<DeviceProfile>> {
            self.inner.find_profile_by_session(session_id)
        }

        fn query_profiles(
            &self,
            query: &SimilarityQuery,
            limit: usize,
        ) -> StoreResult<Vec<DeviceProfile>> {
            self.inner.query_profiles(query, limit)
        }
    }

    fn analyzer(store: Arc<MemoryStore>) -> SessionAnalyzer {
        SessionAnalyzer::new(
            store,
            AnalyzerConfig::default(),
            ModelConfig::default(),
            RiskConfig::default(),
        )
    }

    fn sample(session: &str, speeds: &[f64], at: DateTime<Utc>) -> BehaviorSample {
        BehaviorSample::new(session)
            .captured_at(at)
            .with_mouse_speeds(speeds)
            .with_typing_speeds(&[4.0])
    }

    #[test]
    fn cold_start_reports_no_score_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let a = analyzer(store.clone());
        let now = Utc::now();
        let r = a.analyze_at(&sample("s1", &[2.0], now), now).unwrap();
        assert_eq!(r.status, AnalysisStatus::ColdStart);
        assert!(r.risk_score.is_none() && r.level.is_none() && r.model.is_none());
        assert_eq!(r.history_len, 0);
        assert_eq!(store.behavior_count(), 1);
    }

    #[test]
    fn four_prior_samples_stay_cold_five_train() {
        let store = Arc::new(MemoryStore::new());
        let a = analyzer(store.clone());
        let now = Utc::now();
        for speed in [1.8, 1.9, 2.0, 2.1] {
            a.analyze_at(&sample("s1", &[speed], now), now).unwrap();
        }
        assert_eq!(a.session_state("s1").unwrap(), SessionState::ColdStart);

        let fifth = a.analyze_at(&sample("s1", &[2.2], now), now).unwrap();
        assert_eq!(fifth.history_len, 4);
        assert_eq!(fifth.status, AnalysisStatus::ColdStart);
        assert_eq!(a.session_state("s1").unwrap(), SessionState::Trainable);

        let sixth = a.analyze_at(&sample("s1", &[2.0], now), now).unwrap();
        assert_eq!(sixth.history_len, 5);
        assert_eq!(sixth.status, AnalysisStatus::Scored);
        assert_eq!(sixth.model.as_ref().unwrap().trained_on, 5);
        assert_eq!(a.session_state("s1").unwrap(), SessionState::Trained);
        let risk = sixth.risk_score.unwrap();
        assert!((0.0..=1.0).contains(&risk));
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let a = analyzer(Arc::new(MemoryStore::new()));
        assert!(matches!(a.analyze(&BehaviorSample::new("")), Err(Error::InvalidSample)));
    }

    #[test]
    fn evict_forgets_the_model() {
        let store = Arc::new(MemoryStore::new());
        let a = analyzer(store);
        let now = Utc::now();
        a.analyze_at(&sample("s1", &[1.0], now), now).unwrap();
        assert_eq!(a.tracked_sessions(), 1);
        assert!(a.evict("s1"));
        assert_eq!(a.tracked_sessions(), 0);
    }

    #[test]
    fn extreme_speeds_in_history_still_score() {
        let store = Arc::new(MemoryStore::new());
        let a = analyzer(store);
        let now = Utc::now();
        let history: [&[f64]; 5] = [&[1e308], &[-1e308], &[1.7e308, 1.7e308], &[1.0], &[2.0]];
        for speeds in history {
            a.analyze_at(&sample("s1", speeds, now), now).unwrap();
        }
        let r = a.analyze_at(&sample("s1", &[1.5], now), now).unwrap();
        assert_eq!(r.status, AnalysisStatus::Scored);
        assert!(r.features.avg_mouse_speed.is_finite());
        let risk = r.risk_score.unwrap();
        assert!(risk.is_finite() && (0.0..=1.0).contains(&risk));
    }

    #[test]
    fn registry_stays_within_max_sessions() {
        let store = Arc::new(MemoryStore::new());
        let config = AnalyzerConfig {
            max_sessions: 3,
            ..AnalyzerConfig::default()
        };
        let a = SessionAnalyzer::new(store.clone(), config, ModelConfig::default(), RiskConfig::default());
        let now = Utc::now();
        for i in 0..20 {
            a.analyze_at(&sample(&format!("s{i}"), &[1.0], now), now).unwrap();
            assert!(a.tracked_sessions() <= 3);
        }
        assert_eq!(a.tracked_sessions(), 3);
        assert_eq!(store.behavior_count(), 20);
    }

    #[test]
    fn evicted_session_refits_from_history() {
        let store = Arc::new(MemoryStore::new());
        let config = AnalyzerConfig {
            max_sessions: 1,
            ..AnalyzerConfig::default()
        };
        let a = SessionAnalyzer::new(store, config, ModelConfig::default(), RiskConfig::default());
        let now = Utc::now();
        for speed in [1.8, 1.9, 2.0, 2.1, 2.2] {
            a.analyze_at(&sample("kept", &[speed], now), now).unwrap();
        }
        a.analyze_at(&sample("other", &[1.0], now), now).unwrap();
        assert_eq!(a.tracked_sessions(), 1);

        let r = a.analyze_at(&sample("kept", &[2.0], now), now).unwrap();
        assert_eq!(r.status, AnalysisStatus::Scored);
        assert_eq!(r.model.unwrap().trained_on, 5);
    }

    #[test]
    fn failed_history_read_is_store_unavailable() {
        let store = Arc::new(FlakyStore::default());
        let a = SessionAnalyzer::new(
            store.clone(),
            AnalyzerConfig::default(),
            ModelConfig::default(),
            RiskConfig::default(),
        );
        store.reads_down.store(true, Ordering::SeqCst);
        let err = a.analyze(&sample("s1", &[1.0], Utc::now())).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(StoreError::Unavailable(_))));
        assert_eq!(store.inner.behavior_count(), 0);
        assert!(matches!(a.session_state("s1"), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn failed_sample_write_is_store_unavailable() {
        let store = Arc::new(FlakyStore::default());
        let a = SessionAnalyzer::new(
            store.clone(),
            AnalyzerConfig::default(),
            ModelConfig::default(),
            RiskConfig::default(),
        );
        let now = Utc::now();
        for speed in [1.8, 1.9, 2.0, 2.1, 2.2] {
            a.analyze_at(&sample("s1", &[speed], now), now).unwrap();
        }
        store.writes_down.store(true, Ordering::SeqCst);
        let err = a.analyze_at(&sample("s1", &[2.0], now), now).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(StoreError::Unavailable(_))));
        assert_eq!(store.inner.behavior_count(), 5);
    }
}
