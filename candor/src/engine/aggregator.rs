// candor/src/engine/aggregator.rs
//
// Weighted signal aggregation.
//
// Each present signal contributes weight × penalty, where every penalty is
// normalized to [0,1] before weighting:
//   liveness     1 − liveness_score
//   face_match   1 − face_match_score
//   voice_match  1 − voice_match_score
//   text_ai      text_ai_score            (the AI probability is the penalty)
//   visibility   min(1, visibility_events_count / 10)
//   devtools     1 if latched, else 0     (stepped, not scaled)
//
// Absent signals contribute nothing. heartbeat_gaps, tab_switches_count and
// window_blur_count are recorded on the record but deliberately not scored.
//
// The result is NOT capped at 1: its ceiling is the sum of the weights. No
// rounding is applied, so threshold comparisons see the exact sum.

use serde::{Deserialize, Serialize};

use crate::config::Weights;
use crate::state::record::FraudRecord;

/// Visibility events at which the visibility penalty saturates.
pub const VISIBILITY_SATURATION: f64 = 10.0;

/// Weighted contribution of each term. Absent signals are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub liveness: f64,
    pub face_match: f64,
    pub voice_match: f64,
    pub text_ai: f64,
    pub visibility: f64,
    pub devtools: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.liveness + self.face_match + self.voice_match + self.text_ai + self.visibility + self.devtools
    }

    /// Terms sorted by contribution, largest first, zero terms dropped.
    pub fn ranked(&self) -> Vec<(&'static str, f64)> {
        let mut terms: Vec<(&'static str, f64)> = [
            ("liveness", self.liveness),
            ("face_match", self.face_match),
            ("voice_match", self.voice_match),
            ("text_ai", self.text_ai),
            ("visibility", self.visibility),
            ("devtools", self.devtools),
        ]
        .into_iter()
        .filter(|(_, v)| *v > 0.0)
        .collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1));
        terms
    }
}

pub fn visibility_penalty(events: u32) -> f64 {
    (events as f64 / VISIBILITY_SATURATION).min(1.0)
}

pub fn breakdown(record: &FraudRecord, weights: &Weights) -> ScoreBreakdown {
    let complement = |v: Option<f64>, w: f64| v.map(|s| w * (1.0 - s)).unwrap_or(0.0);

    ScoreBreakdown {
        liveness: complement(record.liveness_score, weights.liveness),
        face_match: complement(record.face_match_score, weights.face_match),
        voice_match: complement(record.voice_match_score, weights.voice_match),
        text_ai: record.text_ai_score.map(|s| weights.text_ai * s).unwrap_or(0.0),
        visibility: weights.visibility * visibility_penalty(record.visibility_events_count),
        devtools: if record.devtools_detected { weights.devtools } else { 0.0 },
    }
}

pub fn score(record: &FraudRecord, weights: &Weights) -> f64 {
    breakdown(record, weights).total()
}
