//! Integration tests: analysis lifecycle, session isolation, encrypted store, device profiles.

use behavior_risk::{
    config::{AnalyzerConfig, ModelConfig, RiskConfig, ServiceConfig},
    fingerprint::{DeviceFingerprint, FingerprintMatcher, HeuristicUaParser},
    service::AnalyticsService,
    session::{AnalysisStatus, SessionAnalyzer},
    storage::{MemoryStore, SecureStore, Store},
    telemetry::BehaviorSample,
};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn captured() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn evaluated() -> DateTime<Utc> {
    captured() + chrono::Duration::seconds(90)
}

fn sample(session: &str, mouse: &[f64]) -> BehaviorSample {
    BehaviorSample::new(session)
        .captured_at(captured())
        .with_mouse_speeds(mouse)
        .with_typing_speeds(&[6.0, 6.0])
}

const PRIOR: [[f64; 2]; 5] = [[1.7, 1.9], [1.8, 2.0], [1.9, 2.1], [2.0, 2.2], [2.1, 2.3]];

fn analyzer(store: Arc<dyn Store>) -> SessionAnalyzer {
    SessionAnalyzer::new(
        store,
        AnalyzerConfig::default(),
        ModelConfig::default(),
        RiskConfig::default(),
    )
}

fn seed_history(a: &SessionAnalyzer, session: &str, prior: &[[f64; 2]]) {
    for speeds in prior {
        let r = a.analyze_at(&sample(session, speeds), evaluated()).unwrap();
        assert_eq!(r.status, AnalysisStatus::ColdStart);
    }
}

fn risk_after_history(current: &[f64]) -> f64 {
    let a = analyzer(Arc::new(MemoryStore::new()));
    seed_history(&a, "S1", &PRIOR);
    let r = a.analyze_at(&sample("S1", current), evaluated()).unwrap();
    assert_eq!(r.status, AnalysisStatus::Scored);
    assert_eq!(r.history_len, 5);
    r.risk_score.unwrap()
}

#[test]
fn config_load_default() {
    let c = ServiceConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.analyzer.min_history, 5);
    assert_eq!(c.model.seed, 42);
    assert_eq!(c.matcher.similar_limit, 5);
}

#[test]
fn far_outlier_scores_riskier_than_consistent_sample() {
    let anomalous = risk_after_history(&[50.0, 60.0]);
    let consistent = risk_after_history(&[2.1, 1.9]);
    assert!(
        anomalous > consistent,
        "anomalous={anomalous} consistent={consistent}"
    );
    assert!((0.0..=1.0).contains(&anomalous));
    assert!((0.0..=1.0).contains(&consistent));
}

#[test]
fn repeated_analysis_is_deterministic() {
    assert_eq!(
        risk_after_history(&[3.0, 3.5]).to_bits(),
        risk_after_history(&[3.0, 3.5]).to_bits()
    );
}

#[test]
fn concurrent_sessions_do_not_share_models() {
    let slow: Vec<[f64; 2]> = PRIOR.to_vec();
    let fast: Vec<[f64; 2]> = PRIOR.iter().map(|[a, b]| [a * 40.0, b * 40.0]).collect();
    let current = [2.0, 2.0];

    // Each session alone, in its own analyzer.
    let baseline = |session: &str, prior: &[[f64; 2]]| {
        let a = analyzer(Arc::new(MemoryStore::new()));
        seed_history(&a, session, prior);
        a.analyze_at(&sample(session, &current), evaluated())
            .unwrap()
            .risk_score
            .unwrap()
    };
    let slow_alone = baseline("A", &slow[..]);
    let fast_alone = baseline("B", &fast[..]);
    assert_ne!(slow_alone, fast_alone);

    // Both sessions interleaved against one shared analyzer.
    for _ in 0..4 {
        let shared = analyzer(Arc::new(MemoryStore::new()));
        let (slow_shared, fast_shared) = std::thread::scope(|s| {
            let run = |session: &'static str, prior: &[[f64; 2]]| {
                for speeds in prior {
                    shared.analyze_at(&sample(session, speeds), evaluated()).unwrap();
                    std::thread::yield_now();
                }
                shared
                    .analyze_at(&sample(session, &current), evaluated())
                    .unwrap()
                    .risk_score
                    .unwrap()
            };
            let (slow, fast) = (&slow, &fast);
            let a = s.spawn(move || run("A", &slow[..]));
            let b = s.spawn(move || run("B", &fast[..]));
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(slow_shared.to_bits(), slow_alone.to_bits());
        assert_eq!(fast_shared.to_bits(), fast_alone.to_bits());
        assert_eq!(shared.tracked_sessions(), 2);
    }
}

#[test]
fn one_session_is_analyzed_by_one_writer_at_a_time() {
    let a = analyzer(Arc::new(MemoryStore::new()));
    let mut seen: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let a = &a;
                s.spawn(move || {
                    a.analyze_at(&sample("same", &[2.0 + i as f64 * 0.01]), evaluated())
                        .unwrap()
                        .history_len
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    seen.sort_unstable();
    assert_eq!(seen, (0..8).collect::<Vec<_>>());
}

#[test]
fn secure_store_backs_full_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> =
        Arc::new(SecureStore::open(&dir.path().join("store.db"), b"test-secret").unwrap());
    let a = analyzer(store.clone());
    seed_history(&a, "S1", &PRIOR);
    let r = a.analyze_at(&sample("S1", &[2.0, 2.0]), evaluated()).unwrap();
    assert!(r.is_scored());
    assert_eq!(store.fetch_behavior_history("S1").unwrap().len(), 6);
}

#[test]
fn device_profile_flow_over_secure_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SecureStore::open(&dir.path().join("store.db"), b"test-secret").unwrap());
    let svc = AnalyticsService::new(store, &ServiceConfig::default());

    let first = svc
        .create_or_update_device_profile("203.0.113.5", CHROME_WIN, None)
        .unwrap();
    assert_eq!(first.similar_count, 1);
    assert_eq!(first.device_info.os.family, "Windows");

    let second = svc
        .create_or_update_device_profile("198.51.100.7", CHROME_WIN, None)
        .unwrap();
    assert_eq!(second.similar_count, 2);

    let profile = svc.get_device_profile(&first.profile_id).unwrap().unwrap();
    assert_eq!(profile.fingerprint.ip_address, "203.0.113.5");
    assert!(svc.get_device_profile("missing").unwrap().is_none());
}

#[test]
fn blank_fingerprint_matches_nothing_in_populated_store() {
    let store = MemoryStore::new();
    let matcher = FingerprintMatcher::new(Arc::new(HeuristicUaParser));
    for i in 0..3 {
        let fp = DeviceFingerprint::new(format!("10.0.0.{i}"), CHROME_WIN);
        store
            .store_device_profile(&fp, &fp.parse_user_agent(matcher.parser()))
            .unwrap();
    }
    let found = matcher
        .find_similar(&store, &DeviceFingerprint::new("", ""), 10)
        .unwrap();
    assert!(found.is_empty());
}
