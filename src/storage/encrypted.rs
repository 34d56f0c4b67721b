//! SQLite-backed store with AES-GCM encryption of record payloads.
//! Only the columns needed for session lookup and similarity clauses are kept in plaintext.

use super::{BehaviorRecord, DeviceProfile, Store, StoreResult};
use crate::error::StoreError;
use crate::fingerprint::{DeviceFingerprint, ParsedUserAgent, SimilarityClause, SimilarityQuery};
use crate::telemetry::BehaviorSample;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::path::Path;
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> StoreResult<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|e| StoreError::Crypto(e.to_string()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> StoreResult<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| StoreError::Crypto(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(StoreError::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Crypto(e.to_string()))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|e| StoreError::Crypto(e.to_string()))
}

fn clause_sql(clause: &SimilarityClause) -> (&'static str, &str) {
    match clause {
        SimilarityClause::IpAddress(v) => ("ip_address = ?", v),
        SimilarityClause::BrowserFamily(v) => ("browser_family = ?", v),
        SimilarityClause::OsFamily(v) => ("os_family = ?", v),
        SimilarityClause::ScreenResolution(v) => ("screen_resolution = ?", v),
    }
}

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SecureStore {
    /// Open or create DB at path. Key is derived from `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS behaviors (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_behaviors_session ON behaviors(session_id, seq);
            CREATE TABLE IF NOT EXISTS device_profiles (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                ip_address TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                os_family TEXT NOT NULL,
                screen_resolution TEXT,
                session_id TEXT,
                fingerprint_hash TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_profiles_ip ON device_profiles(ip_address);
            CREATE INDEX IF NOT EXISTS idx_profiles_browser ON device_profiles(browser_family);
            CREATE INDEX IF NOT EXISTS idx_profiles_os ON device_profiles(os_family);
            CREATE INDEX IF NOT EXISTS idx_profiles_screen ON device_profiles(screen_resolution);
            CREATE INDEX IF NOT EXISTS idx_profiles_session ON device_profiles(session_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn seal<T: serde::Serialize>(&self, value: &T) -> StoreResult<String> {
        encrypt(&self.key, serde_json::to_string(value)?.as_bytes())
    }

    fn open_profile(&self, enc: &str) -> StoreResult<DeviceProfile> {
        Ok(serde_json::from_slice(&decrypt(&self.key, enc)?)?)
    }

    fn put_profile(&self, conn: &Connection, profile: &DeviceProfile) -> StoreResult<()> {
        let enc = self.seal(profile)?;
        conn.execute(
            "INSERT INTO device_profiles
                (id, ip_address, browser_family, os_family, screen_resolution, session_id,
                 fingerprint_hash, updated_at, payload_enc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                ip_address = excluded.ip_address,
                browser_family = excluded.browser_family,
                os_family = excluded.os_family,
                screen_resolution = excluded.screen_resolution,
                session_id = excluded.session_id,
                fingerprint_hash = excluded.fingerprint_hash,
                updated_at = excluded.updated_at,
                payload_enc = excluded.payload_enc",
            params![
                profile.id,
                profile.fingerprint.ip_address,
                profile.parsed_user_agent.browser.family,
                profile.parsed_user_agent.os.family,
                profile.fingerprint.screen_resolution,
                profile.fingerprint.session_id,
                profile.fingerprint_hash,
                profile.updated_at.timestamp_millis(),
                enc,
            ],
        )?;
        Ok(())
    }

    /// Retention: delete behavior records created before `ts` (unix millis)
    pub fn prune_behaviors_before(&self, ts: i64) -> StoreResult<u64> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM behaviors WHERE created_at < ?1", params![ts])?;
        Ok(n as u64)
    }
}

impl Store for SecureStore {
    fn store_behavior(&self, sample: &BehaviorSample) -> StoreResult<String> {
        let record = BehaviorRecord {
            id: Uuid::new_v4().to_string(),
            sample: sample.clone(),
            created_at: Utc::now(),
        };
        let enc = self.seal(&record)?;
        self.conn.lock().execute(
            "INSERT INTO behaviors (id, session_id, created_at, payload_enc) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.sample.session_id,
                record.created_at.timestamp_millis(),
                enc
            ],
        )?;
        Ok(record.id)
    }

    fn fetch_behavior_history(&self, session_id: &str) -> StoreResult<Vec<BehaviorSample>> {
        let encrypted: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare("SELECT payload_enc FROM behaviors WHERE session_id = ?1 ORDER BY seq")?;
            let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
            let out = rows.collect::<Result<Vec<String>, _>>()?;
            out
        };
        encrypted
            .iter()
            .map(|enc| {
                let record: BehaviorRecord = serde_json::from_slice(&decrypt(&self.key, enc)?)?;
                Ok(record.sample)
            })
            .collect()
    }

    fn store_device_profile(
        &self,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<String> {
        let profile = DeviceProfile::new(Uuid::new_v4().to_string(), fingerprint, parsed);
        self.put_profile(&self.conn.lock(), &profile)?;
        Ok(profile.id)
    }

    fn update_device_profile(
        &self,
        id: &str,
        fingerprint: &DeviceFingerprint,
        parsed: &ParsedUserAgent,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let enc: Option<String> = conn
            .query_row(
                "SELECT payload_enc FROM device_profiles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(enc) = enc else {
            return Ok(false);
        };
        let mut profile = self.open_profile(&enc)?;
        profile.refresh(fingerprint, parsed);
        self.put_profile(&conn, &profile)?;
        Ok(true)
    }

    fn fetch_device_profile(&self, id: &str) -> StoreResult<Option<DeviceProfile>> {
        let enc: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_enc FROM device_profiles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        enc.map(|e| self.open_profile(&e)).transpose()
    }

    fn find_profile_by_session(&self, session_id: &str) -> StoreResult<Option<DeviceProfile>> {
        let enc: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_enc FROM device_profiles WHERE session_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        enc.map(|e| self.open_profile(&e)).transpose()
    }

    fn query_profiles(&self, query: &SimilarityQuery, limit: usize) -> StoreResult<Vec<DeviceProfile>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let (conds, values): (Vec<&str>, Vec<&str>) = query.clauses.iter().map(clause_sql).unzip();
        let sql = format!(
            "SELECT payload_enc FROM device_profiles WHERE {} ORDER BY seq LIMIT ?",
            conds.join(" OR ")
        );
        // SQLite takes a signed 64-bit LIMIT; anything larger means "all rows".
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut bound: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        bound.push(&limit);
        let encrypted: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(bound.as_slice(), |row| row.get(0))?;
            let out = rows.collect::<Result<Vec<String>, _>>()?;
            out
        };
        encrypted.iter().map(|e| self.open_profile(e)).collect()
    }
}
