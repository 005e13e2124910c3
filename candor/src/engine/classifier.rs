// candor/src/engine/classifier.rs
//
// Three-band threshold classifier:
//   score ≥ reject            → FRAUD_DETECTED
//   review ≤ score < reject   → MANUAL_REVIEW
//   score < review            → CLEAN
//
// SUSPICIOUS is never produced here.
//
// Under EscalationPolicy::FollowScore (default) status is a pure function of
// the latest score, so improving evidence can move a record back to CLEAN.
// EscalationPolicy::Ratchet keeps the most severe status ever reached.

use crate::config::{EscalationPolicy, Thresholds};
use crate::events::FraudStatus;

pub fn classify(score: f64, thresholds: &Thresholds) -> FraudStatus {
    if score >= thresholds.reject {
        FraudStatus::FraudDetected
    } else if score >= thresholds.review {
        FraudStatus::ManualReview
    } else {
        FraudStatus::Clean
    }
}

pub fn resolve(previous: FraudStatus, computed: FraudStatus, policy: EscalationPolicy) -> FraudStatus {
    match policy {
        EscalationPolicy::FollowScore => computed,
        EscalationPolicy::Ratchet => previous.max(computed),
    }
}
