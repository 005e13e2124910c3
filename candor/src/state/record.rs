// candor/src/state/record.rs
//
// FraudRecord — the per-interview aggregate of every signal, behavioral
// counter, and the derived score/status.
//
// Mutators here only touch inputs. Derived fields are written by the
// ingestion service through `apply_verdict`, under the same lock as the input
// change, so no stale score is ever observable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{check_unit_interval, Result};
use crate::events::{FraudStatus, InterviewId, SignalKind};
use crate::workers::heartbeat::HeartbeatDelta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRecord {
    pub interview_id: InterviewId,

    pub liveness_score: Option<f64>,
    pub face_match_score: Option<f64>,
    pub voice_match_score: Option<f64>,
    pub text_ai_score: Option<f64>,

    // Monotonic counters
    pub visibility_events_count: u32,
    pub heartbeat_gaps: u32,
    pub tab_switches_count: u32,
    pub window_blur_count: u32,
    pub devtools_detected: bool, // latch, never reset

    /// Diagnostic payload per signal name. Not used in scoring.
    pub flags: BTreeMap<String, serde_json::Value>,

    pub overall_fraud_score: f64,
    pub status: FraudStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub heartbeats_seen: u64,
}

impl FraudRecord {
    pub fn new(interview_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            interview_id: interview_id.to_string(),
            liveness_score: None,
            face_match_score: None,
            voice_match_score: None,
            text_ai_score: None,
            visibility_events_count: 0,
            heartbeat_gaps: 0,
            tab_switches_count: 0,
            window_blur_count: 0,
            devtools_detected: false,
            flags: BTreeMap::new(),
            overall_fraud_score: 0.0,
            status: FraudStatus::Clean,
            created_at: now,
            updated_at: now,
            last_heartbeat_at: None,
            heartbeats_seen: 0,
        }
    }

    pub fn signal(&self, kind: SignalKind) -> Option<f64> {
        match kind {
            SignalKind::Liveness => self.liveness_score,
            SignalKind::FaceMatch => self.face_match_score,
            SignalKind::VoiceMatch => self.voice_match_score,
            SignalKind::AiText => self.text_ai_score,
        }
    }

    /// Checks inputs that did not arrive through ingestion (checkpoints).
    pub fn validate(&self) -> Result<()> {
        for kind in SignalKind::ALL {
            if let Some(score) = self.signal(kind) {
                check_unit_interval(&format!("{} score", kind), score)?;
            }
        }
        Ok(())
    }

    /// Overwrites one signal and replaces its flag entry.
    /// The caller has already range-checked `score`.
    pub fn set_signal(&mut self, kind: SignalKind, score: f64, flags: serde_json::Map<String, serde_json::Value>) {
        let slot = match kind {
            SignalKind::Liveness => &mut self.liveness_score,
            SignalKind::FaceMatch => &mut self.face_match_score,
            SignalKind::VoiceMatch => &mut self.voice_match_score,
            SignalKind::AiText => &mut self.text_ai_score,
        };
        *slot = Some(score);
        self.flags.insert(kind.flag_key().to_string(), serde_json::Value::Object(flags));
    }

    pub fn set_flag(&mut self, key: &str, value: serde_json::Value) {
        self.flags.insert(key.to_string(), value);
    }

    pub fn apply_heartbeat(&mut self, delta: &HeartbeatDelta) {
        self.heartbeats_seen += 1;
        if delta.visibility_change {
            self.visibility_events_count = self.visibility_events_count.saturating_add(1);
        }
        if delta.blur {
            self.window_blur_count = self.window_blur_count.saturating_add(1);
        }
        if delta.tab_switch {
            self.tab_switches_count = self.tab_switches_count.saturating_add(1);
        }
        if delta.gap {
            self.heartbeat_gaps = self.heartbeat_gaps.saturating_add(1);
        }
        if delta.devtools_suspected {
            self.devtools_detected = true;
        }
        // Late heartbeats never move the clock backwards.
        if self.last_heartbeat_at.map_or(true, |last| delta.observed_at > last) {
            self.last_heartbeat_at = Some(delta.observed_at);
        }
    }

    pub fn apply_verdict(&mut self, score: f64, status: FraudStatus, now: DateTime<Utc>) {
        self.overall_fraud_score = score;
        self.status = status;
        self.updated_at = now;
    }
}
