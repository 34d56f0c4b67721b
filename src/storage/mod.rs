//! Behavior and device-profile persistence behind the [`Store`] seam.

mod encrypted;
mod memory;

pub use encrypted::SecureStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::fingerprint::{DeviceFingerprint, ParsedUserAgent, SimilarityQuery};
use crate::telemetry::BehaviorSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted behavior sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub id: String,
    pub sample: BehaviorSample,
    pub created_at: DateTime<Utc>,
}

/// A persisted fingerprint plus the user-agent decoding it was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: String,
    #[serde(flatten)]
    pub fingerprint: DeviceFingerprint,
    pub parsed_user_agent: ParsedUserAgent,
    pub fingerprint_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceProfile {
    pub fn new(id: String, fingerprint: &DeviceFingerprint, parsed: &ParsedUserAgent) -> Self {
        let now = Utc::now();
        Self {
            id,
            fingerprint_hash: fingerprint.digest(),
            fingerprint: fingerprint.clone(),
            parsed_user_agent: parsed.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace fingerprint-derived fields, keeping id and creation time.
    pub fn refresh(&mut self, fingerprint: &DeviceFingerprint, parsed: &ParsedUserAgent) {
        self.fingerprint = fingerprint.clone();
        self.parsed_user_agent = parsed.clone();
        self.fingerprint_hash = fingerprint.digest();
        self.updated_at = Utc::now();
    }
}

/// Storage collaborator. Implementations own ordering and limiting of query results;
/// retries, if any, happen inside the implementation.
pub trait Store: Send + Sync {
    fn store_behavior(&self, sample: &BehaviorSample) -> StoreResult<String>;

    /// All samples for one session, in insertion order.
    fn fetch_behavior_history(&self, session_id: &str) -> StoreResult<Vec<BehaviorSample>>;

    fn store_device_profile(
        &self,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<String>;

    /// Returns `false` when no profile has this id.
    fn update_device_profile(
        &self,
        id: &str,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<bool>;

    fn fetch_device_profile(&self, id: &str) -> StoreResult<Option<DeviceProfile>>;

    /// Most recently created profile carrying this session id.
    fn find_profile_by_session(&self, session_id: &str) -> StoreResult<Option<DeviceProfile>>;

    /// Profiles matching any clause, at most `limit`. An empty query yields nothing.
    fn query_profiles(&self, query: &SimilarityQuery, limit: usize) -> StoreResult<Vec<DeviceProfile>>;
}
