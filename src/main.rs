//! Line-oriented driver: one JSON request per stdin line, one JSON response per stdout line.
//! Logs go to stderr.

use behavior_risk::{
    config::ServiceConfig,
    fingerprint::DeviceFingerprint,
    logging::{LogEvent, StructuredLogger},
    service::AnalyticsService,
    storage::{MemoryStore, SecureStore, Store},
    telemetry::BehaviorSample,
    Error,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    AnalyzeBehavior(BehaviorSample),
    DeviceProfile {
        ip_address: String,
        #[serde(default)]
        user_agent: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    RegisterFingerprint(DeviceFingerprint),
    GetDeviceProfile {
        profile_id: String,
    },
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Request::AnalyzeBehavior(_) => "analyze_behavior",
            Request::DeviceProfile { .. } => "device_profile",
            Request::RegisterFingerprint(_) => "register_fingerprint",
            Request::GetDeviceProfile { .. } => "get_device_profile",
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Response {
    Ok { data: serde_json::Value },
    NotFound { detail: String },
    InvalidRequest { detail: String },
    Unavailable { detail: String },
}

fn error_response(e: Error) -> Response {
    match e {
        Error::StoreUnavailable(_) => Response::Unavailable {
            detail: e.to_string(),
        },
        _ => Response::InvalidRequest {
            detail: e.to_string(),
        },
    }
}

fn ok<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(data) => Response::Ok { data },
        Err(e) => Response::InvalidRequest {
            detail: e.to_string(),
        },
    }
}

fn handle(service: &AnalyticsService, req: Request) -> Response {
    match req {
        Request::AnalyzeBehavior(sample) => match service.analyze_behavior(&sample) {
            Ok(r) => ok(&r),
            Err(e) => error_response(e),
        },
        Request::DeviceProfile {
            ip_address,
            user_agent,
            session_id,
        } => match service.create_or_update_device_profile(&ip_address, &user_agent, session_id) {
            Ok(o) => ok(&o),
            Err(e) => error_response(e),
        },
        Request::RegisterFingerprint(fp) => match service.register_fingerprint(&fp) {
            Ok(o) => ok(&o),
            Err(e) => error_response(e),
        },
        Request::GetDeviceProfile { profile_id } => match service.get_device_profile(&profile_id) {
            Ok(Some(p)) => ok(&p),
            Ok(None) => Response::NotFound {
                detail: "Profile not found".to_string(),
            },
            Err(e) => error_response(e),
        },
    }
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(dir) = config.data_dir.as_ref() else {
        warn!("no data_dir configured; using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    std::fs::create_dir_all(dir)?;
    let secret = std::env::var(&config.store_secret_env)
        .map_err(|_| format!("{} must be set when data_dir is configured", config.store_secret_env))?;
    Ok(Arc::new(SecureStore::open(&dir.join("store.db"), secret.as_bytes())?))
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("BEHAVIOR_RISK_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = ServiceConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(data_dir = ?config.data_dir, "behavior-risk starting");

    let store = open_store(&config)?;
    let service = AnalyticsService::new(store, &config);

    let stdin = std::io::stdin();
    let mut out = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (op, response) = match serde_json::from_str::<Request>(&line) {
            Ok(req) => (req.op(), handle(&service, req)),
            Err(e) => (
                "unknown",
                Response::InvalidRequest {
                    detail: e.to_string(),
                },
            ),
        };
        let data = match &response {
            Response::Ok { data } => Some(data),
            _ => None,
        };
        let field = |k: &str| data.and_then(|d| d.get(k)).and_then(|v| v.as_str());
        let error = match &response {
            Response::NotFound { detail }
            | Response::InvalidRequest { detail }
            | Response::Unavailable { detail } => Some(detail.as_str()),
            Response::Ok { .. } => None,
        };
        let audit = LogEvent {
            ts: Utc::now().to_rfc3339(),
            op,
            session_id: field("session_id"),
            profile_id: field("profile_id").or_else(|| field("id")),
            risk_score: data
                .and_then(|d| d.get("risk_score"))
                .and_then(|v| v.as_f64()),
            error,
        };
        StructuredLogger::emit_json(&audit, &mut std::io::stderr())?;
        StructuredLogger::emit_json(&response, &mut out)?;
    }

    info!("behavior-risk stopping");
    Ok(())
}
