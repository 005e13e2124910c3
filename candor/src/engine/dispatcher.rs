// candor/src/engine/dispatcher.rs
//
// Writes ingestion outcomes to JSONL files in the output directory:
//   audit_log.jsonl           — every successful command
//   status_transitions.jsonl  — every status change
//   review_queue.jsonl        — changes into MANUAL_REVIEW or FRAUD_DETECTED
//
// Runs after ingestion has committed, never under a record lock. The daemon
// feeds a single `run` loop over a channel, so lines land in commit order and
// everything queued before shutdown is written. Wire these files to the
// reporting pipeline / recruiter notifications in production.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::Result;
use crate::events::{FraudStatus, InterviewId, StatusTransition, Verdict};

pub const AUDIT_LOG: &str = "audit_log.jsonl";
pub const TRANSITIONS: &str = "status_transitions.jsonl";
pub const REVIEW_QUEUE: &str = "review_queue.jsonl";

/// One committed command: its op name and the verdict it produced.
pub type AuditItem = (&'static str, Verdict);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub interview_id: InterviewId,
    pub op: String,
    pub overall_fraud_score: f64,
    pub status: FraudStatus,
    pub timestamp: DateTime<Utc>,
}

pub struct Dispatcher {
    out: PathBuf,
}

impl Dispatcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let out: PathBuf = output_dir.into();
        std::fs::create_dir_all(&out)?;
        Ok(Self { out })
    }

    /// Records one committed command. Returns the transition, if the command
    /// changed the record's status.
    pub async fn dispatch(&self, op: &str, verdict: &Verdict) -> Result<Option<StatusTransition>> {
        let entry = AuditEntry {
            interview_id: verdict.interview_id.clone(),
            op: op.to_string(),
            overall_fraud_score: verdict.overall_fraud_score,
            status: verdict.status,
            timestamp: verdict.timestamp,
        };
        self.write(AUDIT_LOG, &(serde_json::to_string(&entry)? + "\n")).await?;

        if !verdict.transitioned() {
            return Ok(None);
        }

        let transition = StatusTransition::from_verdict(verdict, op);
        let line = transition.to_jsonl()?;
        self.write(TRANSITIONS, &line).await?;

        if matches!(transition.to, FraudStatus::ManualReview | FraudStatus::FraudDetected) {
            self.write(REVIEW_QUEUE, &line).await?;
            info!(
                "REVIEW_QUEUED interview={} status={} score={:.4}",
                transition.interview_id, transition.to, transition.overall_fraud_score
            );
        }
        Ok(Some(transition))
    }

    /// Dispatches items in arrival order until every sender is dropped.
    /// Returns how many were written.
    pub async fn run<F>(self, mut rx: mpsc::Receiver<AuditItem>, mut on_transition: F) -> usize
    where
        F: FnMut(&StatusTransition),
    {
        let mut written = 0;
        while let Some((op, verdict)) = rx.recv().await {
            match self.dispatch(op, &verdict).await {
                Ok(Some(t)) => {
                    on_transition(&t);
                    written += 1;
                }
                Ok(None) => written += 1,
                Err(e) => error!(interview_id = %verdict.interview_id, op, "dispatch failed: {}", e),
            }
        }
        written
    }

    async fn write(&self, file: &str, content: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.out.join(file))
            .await?;
        f.write_all(content.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn verdict(prev: FraudStatus, now: FraudStatus, score: f64) -> Verdict {
        Verdict {
            interview_id: "iv".into(),
            overall_fraud_score: score,
            status: now,
            previous_status: prev,
            timestamp: Utc::now(),
        }
    }

    fn lines(dir: &Path, file: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(file))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn steady_status_only_audits() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path()).unwrap();
        let t = d
            .dispatch("heartbeat", &verdict(FraudStatus::Clean, FraudStatus::Clean, 0.1))
            .await
            .unwrap();
        assert!(t.is_none());
        assert_eq!(lines(dir.path(), AUDIT_LOG).len(), 1);
        assert!(lines(dir.path(), TRANSITIONS).is_empty());
    }

    #[tokio::test]
    async fn escalation_is_queued_for_review() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path()).unwrap();
        let t = d
            .dispatch("liveness", &verdict(FraudStatus::Clean, FraudStatus::FraudDetected, 0.9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.trigger, "liveness");

        let queued: StatusTransition = serde_json::from_str(&lines(dir.path(), REVIEW_QUEUE)[0]).unwrap();
        assert_eq!(queued.from, FraudStatus::Clean);
        assert_eq!(queued.to, FraudStatus::FraudDetected);
    }

    #[tokio::test]
    async fn run_drains_queue_in_order_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path()).unwrap();
        let (tx, rx) = mpsc::channel(4);

        let sent = [
            ("ai_text", verdict(FraudStatus::Clean, FraudStatus::ManualReview, 0.7)),
            ("heartbeat", verdict(FraudStatus::ManualReview, FraudStatus::ManualReview, 0.71)),
            ("liveness", verdict(FraudStatus::ManualReview, FraudStatus::FraudDetected, 0.9)),
        ];
        let producer = tokio::spawn(async move {
            for item in sent {
                tx.send(item).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        let written = d.run(rx, |t| seen.push(t.to)).await;
        producer.await.unwrap();

        assert_eq!(written, 3);
        assert_eq!(seen, vec![FraudStatus::ManualReview, FraudStatus::FraudDetected]);
        assert_eq!(lines(dir.path(), AUDIT_LOG).len(), 3);

        let queued: Vec<StatusTransition> = lines(dir.path(), REVIEW_QUEUE)
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].trigger, "ai_text");
        assert_eq!(queued[1].to, FraudStatus::FraudDetected);
    }

    #[tokio::test]
    async fn downgrade_is_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(dir.path()).unwrap();
        d.dispatch("face_match", &verdict(FraudStatus::ManualReview, FraudStatus::Clean, 0.3))
            .await
            .unwrap();
        assert_eq!(lines(dir.path(), TRANSITIONS).len(), 1);
        assert!(lines(dir.path(), REVIEW_QUEUE).is_empty());
    }
}
