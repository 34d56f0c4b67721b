//! Similar-device predicate built from one fingerprint.
//!
//! The query is an unweighted OR over four equality clauses. Execution,
//! ordering and limiting belong to the store; results are not similarity-ranked.

use super::user_agent::{UserAgentParser, UNKNOWN_FAMILY};
use super::DeviceFingerprint;
use crate::error::Result;
use crate::storage::{DeviceProfile, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum SimilarityClause {
    IpAddress(String),
    BrowserFamily(String),
    OsFamily(String),
    ScreenResolution(String),
}

impl SimilarityClause {
    pub fn matches(&self, profile: &DeviceProfile) -> bool {
        match self {
            SimilarityClause::IpAddress(ip) => profile.fingerprint.ip_address == *ip,
            SimilarityClause::BrowserFamily(f) => profile.parsed_user_agent.browser.family == *f,
            SimilarityClause::OsFamily(f) => profile.parsed_user_agent.os.family == *f,
            SimilarityClause::ScreenResolution(r) => {
                profile.fingerprint.screen_resolution.as_deref() == Some(r.as_str())
            }
        }
    }
}

/// Disjunction of clauses. An empty query matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub clauses: Vec<SimilarityClause>,
}

impl SimilarityQuery {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, profile: &DeviceProfile) -> bool {
        self.clauses.iter().any(|c| c.matches(profile))
    }
}

fn present(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Parser-unknown families carry no device information and never form a clause.
fn known_family(family: &str) -> Option<String> {
    present(family).filter(|f| f != UNKNOWN_FAMILY)
}

pub struct FingerprintMatcher {
    parser: Arc<dyn UserAgentParser>,
}

impl FingerprintMatcher {
    pub fn new(parser: Arc<dyn UserAgentParser>) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &dyn UserAgentParser {
        self.parser.as_ref()
    }

    pub fn build_query(&self, fingerprint: &DeviceFingerprint) -> SimilarityQuery {
        let parsed = fingerprint.parse_user_agent(self.parser.as_ref());
        let clauses = [
            present(&fingerprint.ip_address).map(SimilarityClause::IpAddress),
            known_family(&parsed.browser.family).map(SimilarityClause::BrowserFamily),
            known_family(&parsed.os.family).map(SimilarityClause::OsFamily),
            fingerprint
                .screen_resolution
                .as_deref()
                .and_then(present)
                .map(SimilarityClause::ScreenResolution),
        ]
        .into_iter()
        .flatten()
        .collect();
        SimilarityQuery { clauses }
    }

    /// Run `query` against the store. Output order is the store's.
    pub fn find(&self, store: &dyn Store, query: &SimilarityQuery, limit: usize) -> Result<Vec<DeviceProfile>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        Ok(store.query_profiles(query, limit)?)
    }

    pub fn find_similar(
        &self,
        store: &dyn Store,
        fingerprint: &DeviceFingerprint,
        limit: usize,
    ) -> Result<Vec<DeviceProfile>> {
        let query = self.build_query(fingerprint);
        tracing::debug!(clauses = query.clauses.len(), limit, "similar profile lookup");
        self.find(store, &query, limit)
    }
}
