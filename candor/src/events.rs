// candor/src/events.rs
//
// Shared domain types flowing through candor: signal readings from the
// provider layer, client heartbeats, the JSONL ingest commands the daemon
// consumes, and the verdicts / transitions it emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interviews are keyed by the id the interview workflow assigns them.
pub type InterviewId = String;

/// Free-form diagnostic payload attached to one signal reading.
pub type Flags = serde_json::Map<String, serde_json::Value>;

// ── Fraud status ──────────────────────────────────────────────────────────────

/// Declaration order is severity order (used by the ratchet policy).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudStatus {
    #[default]
    Clean,
    /// Reserved. No classifier band produces it.
    Suspicious,
    ManualReview,
    FraudDetected,
}

impl std::fmt::Display for FraudStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "CLEAN"),
            Self::Suspicious => write!(f, "SUSPICIOUS"),
            Self::ManualReview => write!(f, "MANUAL_REVIEW"),
            Self::FraudDetected => write!(f, "FRAUD_DETECTED"),
        }
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

/// The four provider-backed signals. Behavioral counters are not signals of
/// this kind; they come in through heartbeats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Liveness,
    FaceMatch,
    VoiceMatch,
    AiText,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [Self::Liveness, Self::FaceMatch, Self::VoiceMatch, Self::AiText];

    /// Key the signal's diagnostic flags are stored under in the record.
    pub fn flag_key(self) -> &'static str {
        match self {
            Self::Liveness => "liveness",
            Self::FaceMatch => "face_match",
            Self::VoiceMatch => "voice_match",
            Self::AiText => "ai_text_detection",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::FaceMatch => write!(f, "face_match"),
            Self::VoiceMatch => write!(f, "voice_match"),
            Self::AiText => write!(f, "ai_text"),
        }
    }
}

/// Result of a liveness, face-match or AI-text provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub score: f64,
    #[serde(default)]
    pub flags: Flags,
}

impl SignalReading {
    pub fn new(score: f64) -> Self {
        Self { score, flags: Flags::new() }
    }

    pub fn with_flag(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.flags.insert(key.to_string(), value.into());
        self
    }
}

/// Voice verification additionally reports whether the speech looked synthetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceReading {
    pub score: f64,
    #[serde(default)]
    pub is_synthetic: bool,
    #[serde(default)]
    pub flags: Flags,
}

// ── Heartbeats ────────────────────────────────────────────────────────────────

/// Browser events a client may report in a heartbeat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BrowserEvent {
    #[serde(rename = "visibilitychange")]
    VisibilityChange,
    #[serde(rename = "blur")]
    Blur,
    #[serde(rename = "tab_switch")]
    TabSwitch,
    /// Anything a newer client sends that this build does not track.
    #[serde(other)]
    Unknown,
}

impl BrowserEvent {
    /// Exact-token lookup used for the legacy free-text event string.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "visibilitychange" => Some(Self::VisibilityChange),
            "blur" => Some(Self::Blur),
            "tab_switch" => Some(Self::TabSwitch),
            _ => None,
        }
    }
}

/// Periodic client heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub window_width: Option<u32>,
    #[serde(default)]
    pub window_height: Option<u32>,
    #[serde(default)]
    pub is_fullscreen: Option<bool>,
    #[serde(default)]
    pub is_visible: Option<bool>,
    #[serde(default)]
    pub events: Vec<BrowserEvent>,
    /// Legacy clients send a free-form string instead of `events`.
    #[serde(default)]
    pub browser_events: Option<String>,
}

impl Heartbeat {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            user_agent: None,
            window_width: None,
            window_height: None,
            is_fullscreen: None,
            is_visible: None,
            events: Vec::new(),
            browser_events: None,
        }
    }

    pub fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window_width = Some(width);
        self.window_height = Some(height);
        self
    }

    pub fn with_events(mut self, events: &[BrowserEvent]) -> Self {
        self.events.extend_from_slice(events);
        self
    }
}

// ── Ingest commands (daemon input) ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IngestCommand {
    Create {
        interview_id: InterviewId,
    },
    Liveness {
        interview_id: InterviewId,
        #[serde(flatten)]
        reading: SignalReading,
    },
    FaceMatch {
        interview_id: InterviewId,
        #[serde(flatten)]
        reading: SignalReading,
    },
    VoiceMatch {
        interview_id: InterviewId,
        #[serde(flatten)]
        reading: VoiceReading,
    },
    AiText {
        interview_id: InterviewId,
        #[serde(flatten)]
        reading: SignalReading,
    },
    Heartbeat {
        interview_id: InterviewId,
        heartbeat: Heartbeat,
    },
    /// Data-subject deletion: removes the record as a unit.
    Erase {
        interview_id: InterviewId,
    },
}

impl IngestCommand {
    pub fn interview_id(&self) -> &str {
        match self {
            Self::Create { interview_id }
            | Self::Liveness { interview_id, .. }
            | Self::FaceMatch { interview_id, .. }
            | Self::VoiceMatch { interview_id, .. }
            | Self::AiText { interview_id, .. }
            | Self::Heartbeat { interview_id, .. }
            | Self::Erase { interview_id } => interview_id,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Liveness { .. } => "liveness",
            Self::FaceMatch { .. } => "face_match",
            Self::VoiceMatch { .. } => "voice_match",
            Self::AiText { .. } => "ai_text",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Erase { .. } => "erase",
        }
    }
}

// ── Verdicts ──────────────────────────────────────────────────────────────────

/// Score and status of one record right after a successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub interview_id: InterviewId,
    pub overall_fraud_score: f64,
    pub status: FraudStatus,
    pub previous_status: FraudStatus,
    pub timestamp: DateTime<Utc>,
}

impl Verdict {
    pub fn transitioned(&self) -> bool {
        self.status != self.previous_status
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub interview_id: InterviewId,
    pub from: FraudStatus,
    pub to: FraudStatus,
    pub overall_fraud_score: f64,
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusTransition {
    pub fn from_verdict(verdict: &Verdict, trigger: &str) -> Self {
        Self {
            interview_id: verdict.interview_id.clone(),
            from: verdict.previous_status,
            to: verdict.status,
            overall_fraud_score: verdict.overall_fraud_score,
            trigger: trigger.to_string(),
            timestamp: verdict.timestamp,
        }
    }

    pub fn to_jsonl(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)? + "\n")
    }
}
