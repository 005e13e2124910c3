// candor/src/engine/ingest.rs
//
// Signal ingestion API.
//
// Every operation is keyed by interview id and runs entirely under that
// record's write lock: validate → mutate inputs → aggregate → classify →
// commit. Score and status are therefore never stale and never computed
// lazily on read. Validation failures leave the record untouched.
//
// Nothing here performs I/O. Provider calls happen before ingestion (see
// providers::run_*_check) and audit output happens after (engine::dispatcher).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::AntifraudConfig;
use crate::engine::aggregator::{self, ScoreBreakdown};
use crate::engine::classifier;
use crate::error::{check_unit_interval, AntifraudError, Result};
use crate::events::{Flags, Heartbeat, IngestCommand, SignalKind, Verdict};
use crate::report::{self, ExportBundle, FraudReport};
use crate::state::record::FraudRecord;
use crate::state::store::RecordStore;
use crate::workers::heartbeat;

pub struct AntifraudService {
    config: Arc<AntifraudConfig>,
    store: Arc<RecordStore>,
}

impl AntifraudService {
    pub fn new(config: AntifraudConfig) -> Self {
        Self { config: Arc::new(config), store: Arc::new(RecordStore::new()) }
    }

    pub fn config(&self) -> &AntifraudConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Idempotent: a second call returns the existing record unchanged.
    pub fn create_record(&self, interview_id: &str) -> FraudRecord {
        let (record, created) = self.store.create(interview_id, Utc::now());
        if created {
            info!(interview_id, "antifraud record created");
        }
        record
    }

    pub fn get_record(&self, interview_id: &str) -> Result<FraudRecord> {
        self.store
            .get(interview_id)
            .ok_or_else(|| AntifraudError::not_found(interview_id))
    }

    pub fn breakdown(&self, interview_id: &str) -> Result<ScoreBreakdown> {
        let record = self.get_record(interview_id)?;
        Ok(aggregator::breakdown(&record, &self.config.weights))
    }

    pub fn report(&self, interview_id: &str) -> Result<FraudReport> {
        let record = self.get_record(interview_id)?;
        Ok(FraudReport::build(&record, &self.config.weights))
    }

    /// Recomputes score and status from the stored inputs.
    pub fn recompute(&self, interview_id: &str) -> Result<Verdict> {
        let config = Arc::clone(&self.config);
        self.store
            .update(interview_id, |r| Ok(apply_verdict(r, &config, Utc::now())))
    }

    /// Loads checkpointed records. Records with out-of-range inputs are
    /// skipped; the rest are rescored under the running config, since the
    /// checkpoint may predate a weight or threshold change.
    pub fn restore(&self, records: Vec<FraudRecord>) -> usize {
        let valid: Vec<FraudRecord> = records
            .into_iter()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(interview_id = %r.interview_id, "checkpoint record skipped: {}", e);
                    false
                }
            })
            .collect();

        let restored = self.store.restore(valid);
        for id in &restored {
            match self.recompute(id) {
                Ok(verdict) => log_transition(&verdict, "restore"),
                Err(e) => warn!(interview_id = %id, "rescoring restored record failed: {}", e),
            }
        }
        restored.len()
    }

    // ── Provider-backed signals ───────────────────────────────────────────────

    pub fn record_liveness(&self, interview_id: &str, score: f64, flags: Flags) -> Result<Verdict> {
        self.record_signal(interview_id, SignalKind::Liveness, score, flags, None)
    }

    pub fn record_face_match(&self, interview_id: &str, score: f64, flags: Flags) -> Result<Verdict> {
        self.record_signal(interview_id, SignalKind::FaceMatch, score, flags, None)
    }

    /// `is_synthetic` is kept under the `synthetic_speech` flag; it is not scored.
    pub fn record_voice_match(
        &self,
        interview_id: &str,
        score: f64,
        flags: Flags,
        is_synthetic: bool,
    ) -> Result<Verdict> {
        self.record_signal(interview_id, SignalKind::VoiceMatch, score, flags, Some(is_synthetic))
    }

    pub fn record_ai_text_score(&self, interview_id: &str, score: f64, flags: Flags) -> Result<Verdict> {
        self.record_signal(interview_id, SignalKind::AiText, score, flags, None)
    }

    fn record_signal(
        &self,
        interview_id: &str,
        kind: SignalKind,
        score: f64,
        flags: Flags,
        is_synthetic: Option<bool>,
    ) -> Result<Verdict> {
        let config = Arc::clone(&self.config);
        let verdict = self.store.update(interview_id, |r| {
            check_unit_interval(&format!("{} score", kind), score)?;
            r.set_signal(kind, score, flags);
            if let Some(synthetic) = is_synthetic {
                r.set_flag("synthetic_speech", synthetic.into());
            }
            Ok(apply_verdict(r, &config, Utc::now()))
        })?;

        info!(
            interview_id,
            signal = %kind,
            score,
            fraud_score = verdict.overall_fraud_score,
            status = %verdict.status,
            "signal ingested"
        );
        log_transition(&verdict, &kind.to_string());
        Ok(verdict)
    }

    // ── Heartbeats ────────────────────────────────────────────────────────────

    pub fn record_heartbeat(&self, interview_id: &str, hb: &Heartbeat) -> Result<Verdict> {
        let config = Arc::clone(&self.config);
        let (verdict, delta) = self.store.update(interview_id, |r| {
            let delta = heartbeat::analyze(hb, r.last_heartbeat_at, &config.heartbeat)?;
            if delta.devtools_suspected && !r.devtools_detected {
                warn!(
                    interview_id,
                    width = ?hb.window_width,
                    height = ?hb.window_height,
                    "devtools heuristic tripped"
                );
            }
            r.apply_heartbeat(&delta);
            Ok((apply_verdict(r, &config, Utc::now()), delta))
        })?;

        if !delta.is_quiet() {
            info!(
                interview_id,
                visibility = delta.visibility_change,
                blur = delta.blur,
                tab_switch = delta.tab_switch,
                gap = delta.gap,
                fraud_score = verdict.overall_fraud_score,
                status = %verdict.status,
                "heartbeat ingested"
            );
        }
        log_transition(&verdict, "heartbeat");
        Ok(verdict)
    }

    // ── Command entry point (daemon) ──────────────────────────────────────────

    pub fn apply(&self, command: &IngestCommand) -> Result<Verdict> {
        match command {
            IngestCommand::Create { interview_id } => {
                let record = self.create_record(interview_id);
                let at = record.updated_at;
                Ok(steady_verdict(record, at))
            }
            IngestCommand::Liveness { interview_id, reading } => {
                self.record_liveness(interview_id, reading.score, reading.flags.clone())
            }
            IngestCommand::FaceMatch { interview_id, reading } => {
                self.record_face_match(interview_id, reading.score, reading.flags.clone())
            }
            IngestCommand::VoiceMatch { interview_id, reading } => self.record_voice_match(
                interview_id,
                reading.score,
                reading.flags.clone(),
                reading.is_synthetic,
            ),
            IngestCommand::AiText { interview_id, reading } => {
                self.record_ai_text_score(interview_id, reading.score, reading.flags.clone())
            }
            IngestCommand::Heartbeat { interview_id, heartbeat } => {
                self.record_heartbeat(interview_id, heartbeat)
            }
            IngestCommand::Erase { interview_id } => {
                let record = self.erase(interview_id)?;
                Ok(steady_verdict(record, Utc::now()))
            }
        }
    }

    // ── Audit / data-subject requests ─────────────────────────────────────────

    pub fn export(&self, interview_id: &str) -> Result<ExportBundle> {
        let record = self.get_record(interview_id)?;
        report::export_record(record, &self.config.weights)
    }

    /// Removes the record as a unit. The only removal path in the engine.
    pub fn erase(&self, interview_id: &str) -> Result<FraudRecord> {
        let record = self
            .store
            .remove(interview_id)
            .ok_or_else(|| AntifraudError::not_found(interview_id))?;
        info!(interview_id, "antifraud record erased");
        Ok(record)
    }
}

/// Recomputes derived fields in place and reports the before/after status.
fn apply_verdict(record: &mut FraudRecord, config: &AntifraudConfig, now: DateTime<Utc>) -> Verdict {
    let previous = record.status;
    let score = aggregator::score(record, &config.weights);
    let computed = classifier::classify(score, &config.thresholds);
    let status = classifier::resolve(previous, computed, config.escalation);
    record.apply_verdict(score, status, now);

    Verdict {
        interview_id: record.interview_id.clone(),
        overall_fraud_score: score,
        status,
        previous_status: previous,
        timestamp: now,
    }
}

/// Verdict for a command that does not rescore the record.
fn steady_verdict(record: FraudRecord, at: DateTime<Utc>) -> Verdict {
    Verdict {
        interview_id: record.interview_id,
        overall_fraud_score: record.overall_fraud_score,
        status: record.status,
        previous_status: record.status,
        timestamp: at,
    }
}

fn log_transition(verdict: &Verdict, trigger: &str) {
    if verdict.transitioned() {
        info!(
            interview_id = %verdict.interview_id,
            from = %verdict.previous_status,
            to = %verdict.status,
            fraud_score = verdict.overall_fraud_score,
            trigger,
            "fraud status changed"
        );
    }
}
