//! Transport-agnostic request surface: behavior analysis and device profiles.

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::fingerprint::{
    DeviceFingerprint, FingerprintMatcher, HeuristicUaParser, ParsedUserAgent, UserAgentParser,
};
use crate::session::{RiskResult, SessionAnalyzer};
use crate::storage::{DeviceProfile, Store};
use crate::telemetry::BehaviorSample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;

/// Lock stripes serializing profile registration per session id.
const PROFILE_STRIPES: usize = 64;

/// Response to a profile registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOutcome {
    pub profile_id: String,
    /// Similar profiles found after the write; includes the profile itself when it matches
    pub similar_count: usize,
    pub device_info: ParsedUserAgent,
    /// `true` when an existing profile for the session was updated
    pub updated: bool,
}

pub struct AnalyticsService {
    store: Arc<dyn Store>,
    analyzer: SessionAnalyzer,
    matcher: FingerprintMatcher,
    similar_limit: usize,
    profile_locks: Vec<Mutex<()>>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>, config: &ServiceConfig) -> Self {
        Self::with_parser(store, config, Arc::new(HeuristicUaParser::new()))
    }

    pub fn with_parser(
        store: Arc<dyn Store>,
        config: &ServiceConfig,
        parser: Arc<dyn UserAgentParser>,
    ) -> Self {
        let analyzer = SessionAnalyzer::new(
            store.clone(),
            config.analyzer.clone(),
            config.model.clone(),
            config.risk.clone(),
        );
        Self {
            store,
            analyzer,
            matcher: FingerprintMatcher::new(parser),
            similar_limit: config.matcher.similar_limit,
            profile_locks: (0..PROFILE_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn profile_lock(&self, session_id: &str) -> &Mutex<()> {
        let mut h = DefaultHasher::new();
        session_id.hash(&mut h);
        &self.profile_locks[(h.finish() as usize) % self.profile_locks.len()]
    }

    pub fn analyzer(&self) -> &SessionAnalyzer {
        &self.analyzer
    }

    pub fn analyze_behavior(&self, sample: &BehaviorSample) -> Result<RiskResult> {
        self.analyzer.analyze(sample)
    }

    /// Register a connection seen with only transport-level attributes.
    pub fn create_or_update_device_profile(
        &self,
        ip_address: &str,
        user_agent: &str,
        session_id: Option<String>,
    ) -> Result<ProfileOutcome> {
        let fingerprint = DeviceFingerprint::new(ip_address, user_agent).with_session(session_id);
        self.register_fingerprint(&fingerprint)
    }

    /// Store a fingerprint (updating the session's existing profile if any),
    /// then count similar profiles. Registrations for one session id are
    /// serialized from lookup to write, so a session never gets two profiles.
    pub fn register_fingerprint(&self, fingerprint: &DeviceFingerprint) -> Result<ProfileOutcome> {
        let parsed = fingerprint.parse_user_agent(self.matcher.parser());

        let guard = fingerprint
            .session_id
            .as_deref()
            .map(|sid| self.profile_lock(sid).lock());
        let existing = match fingerprint.session_id.as_deref() {
            Some(sid) => self.store.find_profile_by_session(sid)?,
            None => None,
        };
        let updated_id = match existing {
            Some(p) => self
                .store
                .update_device_profile(&p.id, fingerprint, &parsed)?
                .then_some(p.id),
            None => None,
        };
        let (profile_id, updated) = match updated_id {
            Some(id) => (id, true),
            None => (self.store.store_device_profile(fingerprint, &parsed)?, false),
        };
        drop(guard);

        let similar = self
            .matcher
            .find_similar(self.store.as_ref(), fingerprint, self.similar_limit)?;
        info!(
            profile_id = %profile_id,
            updated,
            similar = similar.len(),
            browser = %parsed.browser.family,
            os = %parsed.os.family,
            "device profile registered"
        );
        Ok(ProfileOutcome {
            profile_id,
            similar_count: similar.len(),
            device_info: parsed,
            updated,
        })
    }

    /// `Ok(None)` when no profile has this id.
    pub fn get_device_profile(&self, profile_id: &str) -> Result<Option<DeviceProfile>> {
        Ok(self.store.fetch_device_profile(profile_id)?)
    }

    pub fn similar_profiles(&self, fingerprint: &DeviceFingerprint) -> Result<Vec<DeviceProfile>> {
        self.matcher
            .find_similar(self.store.as_ref(), fingerprint, self.similar_limit)
    }
}
