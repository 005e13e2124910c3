// candor/tests/ingestion.rs
//
// End-to-end ingestion through the public service API.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};

use candor::config::{Thresholds, Weights};
use candor::events::{BrowserEvent, Flags, FraudStatus, Heartbeat, IngestCommand};
use candor::{AntifraudConfig, AntifraudError, AntifraudService};

const EPS: f64 = 1e-9;

fn service() -> AntifraudService {
    AntifraudService::new(AntifraudConfig::default())
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

/// Only the text_ai term is weighted, so the score equals the submitted value.
fn text_only() -> AntifraudConfig {
    AntifraudConfig {
        weights: Weights {
            liveness: 0.0,
            face_match: 0.0,
            voice_match: 0.0,
            text_ai: 1.0,
            visibility: 0.0,
            devtools: 0.0,
        },
        thresholds: Thresholds::default(),
        ..Default::default()
    }
}

#[test]
fn honest_candidate_stays_clean() {
    let svc = service();
    svc.create_record("iv-honest");
    svc.record_liveness("iv-honest", 0.9, Flags::new()).unwrap();
    svc.record_face_match("iv-honest", 0.9, Flags::new()).unwrap();
    svc.record_voice_match("iv-honest", 0.9, Flags::new(), false).unwrap();
    let v = svc.record_ai_text_score("iv-honest", 0.1, Flags::new()).unwrap();

    assert!((v.overall_fraud_score - 0.085).abs() < EPS);
    assert_eq!(v.status, FraudStatus::Clean);

    let r = svc.get_record("iv-honest").unwrap();
    assert_eq!(r.overall_fraud_score, v.overall_fraud_score);
    assert_eq!(r.status, FraudStatus::Clean);
}

#[test]
fn middling_signals_with_visibility_events_score_below_review() {
    let svc = service();
    svc.create_record("iv-weak");
    svc.record_liveness("iv-weak", 0.5, Flags::new()).unwrap(); // 0.125
    svc.record_face_match("iv-weak", 0.5, Flags::new()).unwrap(); // 0.1
    svc.record_voice_match("iv-weak", 0.7, Flags::new(), false).unwrap(); // 0.06
    svc.record_ai_text_score("iv-weak", 0.5, Flags::new()).unwrap(); // 0.1

    let mut last = None;
    for i in 0..2 {
        let hb = Heartbeat::at(t0() + Duration::seconds(5 * i))
            .with_window(1440, 900)
            .with_events(&[BrowserEvent::VisibilityChange]);
        last = Some(svc.record_heartbeat("iv-weak", &hb).unwrap()); // 0.01 each
    }

    let v = last.unwrap();
    assert!((v.overall_fraud_score - 0.405).abs() < EPS);
    assert_eq!(v.status, FraudStatus::Clean);
}

#[test]
fn ai_text_devtools_and_saturated_visibility_stay_clean() {
    let svc = service();
    svc.create_record("iv-mixed");
    svc.record_liveness("iv-mixed", 0.9, Flags::new()).unwrap(); // 0.025
    svc.record_face_match("iv-mixed", 0.9, Flags::new()).unwrap(); // 0.02
    svc.record_voice_match("iv-mixed", 0.9, Flags::new(), false).unwrap(); // 0.02
    svc.record_ai_text_score("iv-mixed", 0.95, Flags::new()).unwrap(); // 0.19

    // First heartbeat trips the devtools latch (0.05); twelve visibility
    // events saturate the visibility term (0.1).
    let mut last = None;
    for i in 0..12 {
        let hb = Heartbeat::at(t0() + Duration::seconds(5 * i)).with_events(&[BrowserEvent::VisibilityChange]);
        let hb = if i == 0 { hb.with_window(700, 500) } else { hb.with_window(1440, 900) };
        last = Some(svc.record_heartbeat("iv-mixed", &hb).unwrap());
    }

    let v = last.unwrap();
    let r = svc.get_record("iv-mixed").unwrap();
    assert!(r.devtools_detected);
    assert_eq!(r.visibility_events_count, 12);
    assert!((v.overall_fraud_score - 0.405).abs() < EPS);
    assert_eq!(v.status, FraudStatus::Clean);
}

#[test]
fn thresholds_are_inclusive() {
    let svc = AntifraudService::new(text_only());
    svc.create_record("iv");

    let v = svc.record_ai_text_score("iv", 0.5999, Flags::new()).unwrap();
    assert_eq!(v.status, FraudStatus::Clean);

    let v = svc.record_ai_text_score("iv", 0.6, Flags::new()).unwrap();
    assert_eq!(v.overall_fraud_score, 0.6);
    assert_eq!(v.status, FraudStatus::ManualReview);

    let v = svc.record_ai_text_score("iv", 0.8499, Flags::new()).unwrap();
    assert_eq!(v.status, FraudStatus::ManualReview);

    let v = svc.record_ai_text_score("iv", 0.85, Flags::new()).unwrap();
    assert_eq!(v.status, FraudStatus::FraudDetected);
    assert_eq!(v.previous_status, FraudStatus::ManualReview);
}

#[test]
fn heavily_suspicious_candidate_is_flagged() {
    let svc = service();
    svc.create_record("iv-bad");
    svc.record_liveness("iv-bad", 0.0, Flags::new()).unwrap();
    svc.record_face_match("iv-bad", 0.0, Flags::new()).unwrap();
    svc.record_voice_match("iv-bad", 0.0, Flags::new(), true).unwrap();
    let v = svc.record_ai_text_score("iv-bad", 1.0, Flags::new()).unwrap();
    assert!((v.overall_fraud_score - 0.85).abs() < EPS);
    assert_eq!(v.status, FraudStatus::FraudDetected);
}

#[test]
fn create_is_idempotent() {
    let svc = service();
    let first = svc.create_record("iv");
    svc.record_face_match("iv", 0.2, Flags::new()).unwrap();
    let second = svc.create_record("iv");

    assert_eq!(first.created_at, second.created_at);
    assert_eq!(second.face_match_score, Some(0.2));
    assert_eq!(svc.store().n_records(), 1);
}

#[test]
fn unknown_interview_is_never_auto_created() {
    let svc = service();
    let hb = Heartbeat::at(t0()).with_window(1440, 900);

    assert!(matches!(
        svc.record_heartbeat("ghost", &hb),
        Err(AntifraudError::NotFound { .. })
    ));
    assert!(matches!(
        svc.record_liveness("ghost", 2.0, Flags::new()),
        Err(AntifraudError::NotFound { .. })
    ));
    assert!(!svc.store().contains("ghost"));
}

#[test]
fn visibility_penalty_saturates_after_ten_heartbeats() {
    let svc = service();
    svc.create_record("iv");

    let mut scores = Vec::new();
    for i in 0..15 {
        let hb = Heartbeat::at(t0() + Duration::seconds(i))
            .with_window(1440, 900)
            .with_events(&[BrowserEvent::VisibilityChange]);
        scores.push(svc.record_heartbeat("iv", &hb).unwrap().overall_fraud_score);
    }

    assert_eq!(svc.get_record("iv").unwrap().visibility_events_count, 15);
    assert!((scores[9] - 0.1).abs() < EPS);
    assert_eq!(scores[9], scores[14]);
}

#[test]
fn devtools_latch_survives_normal_heartbeats() {
    let svc = service();
    svc.create_record("iv");

    let small = Heartbeat::at(t0()).with_window(790, 900);
    assert!((svc.record_heartbeat("iv", &small).unwrap().overall_fraud_score - 0.05).abs() < EPS);

    for i in 1..5 {
        let hb = Heartbeat::at(t0() + Duration::seconds(i)).with_window(1920, 1080);
        let v = svc.record_heartbeat("iv", &hb).unwrap();
        assert!((v.overall_fraud_score - 0.05).abs() < EPS);
    }
    assert!(svc.get_record("iv").unwrap().devtools_detected);
}

#[test]
fn long_silence_counts_a_gap_without_scoring_it() {
    let svc = service();
    svc.create_record("iv");
    svc.record_heartbeat("iv", &Heartbeat::at(t0()).with_window(1440, 900)).unwrap();
    let v = svc
        .record_heartbeat("iv", &Heartbeat::at(t0() + Duration::seconds(45)).with_window(1440, 900))
        .unwrap();

    let r = svc.get_record("iv").unwrap();
    assert_eq!(r.heartbeat_gaps, 1);
    assert_eq!(v.overall_fraud_score, 0.0);
}

#[test]
fn concurrent_heartbeats_lose_no_counts() {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 25;

    let svc = Arc::new(service());
    svc.create_record("iv-busy");

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let hb = Heartbeat::at(t0() + Duration::milliseconds(t * PER_THREAD + i))
                        .with_window(1440, 900)
                        .with_events(&[BrowserEvent::VisibilityChange, BrowserEvent::Blur]);
                    svc.record_heartbeat("iv-busy", &hb).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let r = svc.get_record("iv-busy").unwrap();
    let total = (THREADS * PER_THREAD) as u32;
    assert_eq!(r.visibility_events_count, total);
    assert_eq!(r.window_blur_count, total);
    assert_eq!(r.heartbeats_seen, total as u64);
    assert!((r.overall_fraud_score - 0.1).abs() < EPS);
}

#[test]
fn concurrent_signals_on_distinct_interviews() {
    let svc = Arc::new(service());
    let ids: Vec<String> = (0..16).map(|i| format!("iv-{i}")).collect();
    for id in &ids {
        svc.create_record(id);
    }

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || {
                svc.record_liveness(&id, 0.0, Flags::new()).unwrap();
                svc.record_ai_text_score(&id, 1.0, Flags::new()).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for id in &ids {
        let r = svc.get_record(id).unwrap();
        assert!((r.overall_fraud_score - 0.45).abs() < EPS);
        assert_eq!(r.status, FraudStatus::Clean);
    }
}

#[test]
fn jsonl_commands_drive_the_service() {
    let svc = service();
    let lines = [
        r#"{"op":"create","interview_id":"iv-log"}"#,
        r#"{"op":"liveness","interview_id":"iv-log","score":0.0,"flags":{"spoofing_detected":true}}"#,
        r#"{"op":"face_match","interview_id":"iv-log","score":0.0}"#,
        r#"{"op":"voice_match","interview_id":"iv-log","score":0.0,"is_synthetic":true}"#,
        r#"{"op":"heartbeat","interview_id":"iv-log","heartbeat":{"timestamp":1700000000000,"window_width":1280,"window_height":720,"browser_events":"tab_switch"}}"#,
    ];

    let mut last = None;
    for line in lines {
        let cmd: IngestCommand = serde_json::from_str(line).unwrap();
        last = Some(svc.apply(&cmd).unwrap());
    }

    let v = last.unwrap();
    assert!((v.overall_fraud_score - 0.65).abs() < EPS);
    assert_eq!(v.status, FraudStatus::ManualReview);

    let r = svc.get_record("iv-log").unwrap();
    assert_eq!(r.tab_switches_count, 1);
    assert_eq!(r.flags["liveness"]["spoofing_detected"], true);
    assert_eq!(r.flags["synthetic_speech"], true);
}

#[test]
fn export_then_erase() {
    let svc = service();
    svc.create_record("iv");
    svc.record_ai_text_score("iv", 0.4, Flags::new()).unwrap();

    let bundle = svc.export("iv").unwrap();
    assert!(bundle.verify().unwrap());
    assert!((bundle.breakdown.text_ai - 0.08).abs() < EPS);

    svc.erase("iv").unwrap();
    assert!(matches!(svc.export("iv"), Err(AntifraudError::NotFound { .. })));
}
