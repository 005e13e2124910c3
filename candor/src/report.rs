// candor/src/report.rs
//
// Read-only projections of a fraud record for the interview workflow:
//   FraudReport   — what the interview-results view shows a recruiter
//   ExportBundle  — the full record for audit / data-subject export, sealed
//                   with a SHA-256 digest over its canonical JSON
//
// Record flags are BTreeMap-backed, so the JSON form (and the digest) is
// stable for a given record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Weights;
use crate::engine::aggregator::{self, ScoreBreakdown};
use crate::error::Result;
use crate::events::{FraudStatus, InterviewId};
use crate::state::record::FraudRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudReport {
    pub interview_id: InterviewId,
    pub fraud_score: f64,
    pub fraud_status: FraudStatus,
    pub liveness_score: Option<f64>,
    pub face_match_score: Option<f64>,
    pub voice_match_score: Option<f64>,
    pub text_ai_score: Option<f64>,
    pub visibility_events_count: u32,
    pub heartbeat_gaps: u32,
    pub tab_switches_count: u32,
    pub window_blur_count: u32,
    pub devtools_detected: bool,
    /// Scored terms, largest contribution first.
    pub top_contributors: Vec<(String, f64)>,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl FraudReport {
    pub fn build(record: &FraudRecord, weights: &Weights) -> Self {
        let top_contributors = aggregator::breakdown(record, weights)
            .ranked()
            .into_iter()
            .map(|(name, v)| (name.to_string(), v))
            .collect();

        Self {
            interview_id: record.interview_id.clone(),
            fraud_score: record.overall_fraud_score,
            fraud_status: record.status,
            liveness_score: record.liveness_score,
            face_match_score: record.face_match_score,
            voice_match_score: record.voice_match_score,
            text_ai_score: record.text_ai_score,
            visibility_events_count: record.visibility_events_count,
            heartbeat_gaps: record.heartbeat_gaps,
            tab_switches_count: record.tab_switches_count,
            window_blur_count: record.window_blur_count,
            devtools_detected: record.devtools_detected,
            top_contributors,
            details: record.flags.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub record: FraudRecord,
    pub breakdown: ScoreBreakdown,
    pub exported_at: DateTime<Utc>,
    /// Hex SHA-256 of the record's JSON encoding.
    pub digest: String,
}

impl ExportBundle {
    /// True if `record` still hashes to `digest`.
    pub fn verify(&self) -> Result<bool> {
        Ok(record_digest(&self.record)? == self.digest)
    }
}

pub fn record_digest(record: &FraudRecord) -> Result<String> {
    let body = serde_json::to_vec(record)?;
    let mut h = Sha256::new();
    h.update(b"candor_record:");
    h.update(&body);
    Ok(hex::encode(h.finalize()))
}

pub fn export_record(record: FraudRecord, weights: &Weights) -> Result<ExportBundle> {
    let digest = record_digest(&record)?;
    let breakdown = aggregator::breakdown(&record, weights);
    Ok(ExportBundle { record, breakdown, exported_at: Utc::now(), digest })
}
