// candor/src/config.rs
//
// Process-wide antifraud configuration. Loaded once at startup and shared
// read-only (behind an Arc) for the lifetime of the process.
//
// Default weights (sum = 1.00):
//   liveness    0.25  — live human vs replay / photo / deepfake
//   face_match  0.20  — candidate face vs reference photo
//   voice_match 0.20  — candidate voice vs reference sample
//   text_ai     0.20  — AI-generated answer probability
//   visibility  0.10  — page visibility changes, clamped at 10 events
//   devtools    0.05  — fixed penalty once the devtools heuristic fires
//
// Weights are not required to sum to 1. The score ceiling is the weight sum.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AntifraudError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub liveness: f64,
    pub face_match: f64,
    pub voice_match: f64,
    pub text_ai: f64,
    pub visibility: f64,
    pub devtools: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            liveness: 0.25,
            face_match: 0.2,
            voice_match: 0.2,
            text_ai: 0.2,
            visibility: 0.1,
            devtools: 0.05,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.liveness + self.face_match + self.voice_match + self.text_ai + self.visibility + self.devtools
    }

    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("weights.liveness", self.liveness),
            ("weights.face_match", self.face_match),
            ("weights.voice_match", self.voice_match),
            ("weights.text_ai", self.text_ai),
            ("weights.visibility", self.visibility),
            ("weights.devtools", self.devtools),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub review: f64,
    pub reject: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { review: 0.6, reject: 0.85 }
    }
}

/// How status reacts when a recomputation lowers the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    /// Status always reflects the current score, so it can move back down.
    #[default]
    FollowScore,
    /// Status never drops to a less severe band once reached.
    Ratchet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Window narrower than this trips the devtools heuristic.
    pub devtools_min_width: u32,
    /// Window shorter than this trips the devtools heuristic.
    pub devtools_min_height: u32,
    /// Silence longer than this between two heartbeats counts as one gap.
    pub max_interval_ms: i64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            devtools_min_width: 800,
            devtools_min_height: 600,
            max_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AntifraudConfig {
    pub weights: Weights,
    pub thresholds: Thresholds,
    pub escalation: EscalationPolicy,
    pub heartbeat: HeartbeatConfig,
}

impl AntifraudConfig {
    /// Reads a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("thresholds.review", self.thresholds.review),
            ("thresholds.reject", self.thresholds.reject),
        ];
        for (name, value) in self.weights.named().into_iter().chain(thresholds) {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AntifraudError::Config(format!(
                    "{} must be within [0,1], got {}",
                    name, value
                )));
            }
        }
        if self.thresholds.review > self.thresholds.reject {
            return Err(AntifraudError::Config(format!(
                "thresholds.review ({}) exceeds thresholds.reject ({})",
                self.thresholds.review, self.thresholds.reject
            )));
        }
        if self.heartbeat.max_interval_ms <= 0 {
            return Err(AntifraudError::Config("heartbeat.max_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
