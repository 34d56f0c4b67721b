//! In-process store. Insertion-ordered; used when no data directory is configured.

use super::{BehaviorRecord, DeviceProfile, Store, StoreResult};
use crate::fingerprint::{DeviceFingerprint, ParsedUserAgent, SimilarityQuery};
use crate::telemetry::BehaviorSample;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    behaviors: RwLock<Vec<BehaviorRecord>>,
    profiles: RwLock<Vec<DeviceProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.read().len()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.read().len()
    }
}

impl Store for MemoryStore {
    fn store_behavior(&self, sample: &BehaviorSample) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.behaviors.write().push(BehaviorRecord {
            id: id.clone(),
            sample: sample.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn fetch_behavior_history(&self, session_id: &str) -> StoreResult<Vec<BehaviorSample>> {
        Ok(self
            .behaviors
            .read()
            .iter()
            .filter(|r| r.sample.session_id == session_id)
            .map(|r| r.sample.clone())
            .collect())
    }

    fn store_device_profile(
        &self,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.profiles
            .write()
            .push(DeviceProfile::new(id.clone(), fingerprint, parsed));
        Ok(id)
    }

    fn update_device_profile(
        &self,
        id: &str,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<bool> {
        let mut profiles = self.profiles.write();
        match profiles.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.refresh(fingerprint, parsed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fetch_device_profile(&self, id: &str) -> StoreResult<Option<DeviceProfile>> {
        Ok(self.profiles.read().iter().find(|p| p.id == id).cloned())
    }

    fn find_profile_by_session(&self, session_id: &str) -> StoreResult<Option<DeviceProfile>> {
        Ok(self
            .profiles
            .read()
            .iter()
            .rev()
            .find(|p| p.fingerprint.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    fn query_profiles(&self, query: &SimilarityQuery, limit: usize) -> StoreResult<Vec<DeviceProfile>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .profiles
            .read()
            .iter()
            .filter(|p| query.matches(p))
            .take(limit)
            .cloned()
            .collect())
    }
}
