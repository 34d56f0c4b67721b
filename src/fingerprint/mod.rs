//! Device fingerprints and similar-device matching.

mod matcher;
mod user_agent;

pub use matcher::{FingerprintMatcher, SimilarityClause, SimilarityQuery};
pub use user_agent::{
    BrowserInfo, DeviceInfo, HeuristicUaParser, OsInfo, ParsedUserAgent, UserAgentParser,
    UNKNOWN_FAMILY,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Client and device attributes captured for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub ip_address: String,
    pub user_agent: String,
    #[serde(default)]
    pub screen_resolution: Option<String>,
    #[serde(default)]
    pub color_depth: Option<u32>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub plugins: Option<Vec<String>>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl DeviceFingerprint {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            screen_resolution: None,
            color_depth: None,
            timezone: None,
            language: None,
            platform: None,
            plugins: None,
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_screen_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.screen_resolution = Some(resolution.into());
        self
    }

    /// Re-derive the parsed user agent; never cached on the fingerprint.
    pub fn parse_user_agent(&self, parser: &dyn UserAgentParser) -> ParsedUserAgent {
        parser.parse(&self.user_agent)
    }

    /// Hex SHA-256 over the client-reported attributes (IP, time and session excluded).
    pub fn digest(&self) -> String {
        let mut h = Sha256::new();
        let fields: [Option<&str>; 5] = [
            Some(self.user_agent.as_str()),
            self.screen_resolution.as_deref(),
            self.timezone.as_deref(),
            self.language.as_deref(),
            self.platform.as_deref(),
        ];
        for f in fields {
            h.update(f.unwrap_or("").as_bytes());
            h.update([0u8]);
        }
        h.update(self.color_depth.unwrap_or(0).to_le_bytes());
        for p in self.plugins.iter().flatten() {
            h.update(p.as_bytes());
            h.update([0u8]);
        }
        let mut out = String::with_capacity(64);
        for b in h.finalize() {
            let _ = write!(out, "{:02x}", b);
        }
        out
    }
}
