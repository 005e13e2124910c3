// candor/src/providers/mod.rs
//
// Contracts for the external ML signal providers, and the glue that feeds
// their results into the ingestion service.
//
// Inference itself lives outside this crate. A provider call always happens
// before ingestion and outside any record lock; the engine only ever sees the
// resulting reading. Provider failures are resolved here (neutral fallback)
// and never reach the record store as errors.

pub mod registry;

use thiserror::Error;
use tracing::warn;

use crate::engine::ingest::AntifraudService;
use crate::error::Result;
use crate::events::{SignalKind, SignalReading, Verdict, VoiceReading};

/// Score substituted when a provider cannot answer.
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out")]
    Timeout,
    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

pub trait LivenessProvider: Send + Sync {
    fn check(&self, video: &[u8]) -> ProviderResult<SignalReading>;
}

pub trait FaceMatchProvider: Send + Sync {
    fn verify(&self, candidate_image: &[u8], reference_image: &[u8]) -> ProviderResult<SignalReading>;
}

pub trait VoiceMatchProvider: Send + Sync {
    fn verify(&self, candidate_audio: &[u8], reference_audio: &[u8]) -> ProviderResult<VoiceReading>;
}

pub trait AiTextProvider: Send + Sync {
    /// The reading's score is the probability that `text` is machine-written.
    fn detect(&self, text: &str) -> ProviderResult<SignalReading>;
}

// ── Fallback policy ───────────────────────────────────────────────────────────

/// Neutral reading recorded in place of a failed provider call. The flags
/// mark it as a fallback so reviewers can tell it from a real measurement.
pub fn neutral_reading(kind: SignalKind, err: &ProviderError) -> SignalReading {
    warn!(signal = %kind, error = %err, "provider failed, using neutral score");
    SignalReading::new(NEUTRAL_SCORE)
        .with_flag("fallback", true)
        .with_flag("reason", err.to_string())
}

pub fn with_neutral_fallback(kind: SignalKind, result: ProviderResult<SignalReading>) -> SignalReading {
    result.unwrap_or_else(|e| neutral_reading(kind, &e))
}

// ── Provider → ingestion ──────────────────────────────────────────────────────

pub fn run_liveness_check(
    service: &AntifraudService,
    provider: &dyn LivenessProvider,
    interview_id: &str,
    video: &[u8],
) -> Result<Verdict> {
    service.get_record(interview_id)?;
    let reading = with_neutral_fallback(SignalKind::Liveness, provider.check(video));
    service.record_liveness(interview_id, reading.score, reading.flags)
}

pub fn run_face_match_check(
    service: &AntifraudService,
    provider: &dyn FaceMatchProvider,
    interview_id: &str,
    candidate_image: &[u8],
    reference_image: &[u8],
) -> Result<Verdict> {
    service.get_record(interview_id)?;
    let reading = with_neutral_fallback(
        SignalKind::FaceMatch,
        provider.verify(candidate_image, reference_image),
    );
    service.record_face_match(interview_id, reading.score, reading.flags)
}

pub fn run_voice_check(
    service: &AntifraudService,
    provider: &dyn VoiceMatchProvider,
    interview_id: &str,
    candidate_audio: &[u8],
    reference_audio: &[u8],
) -> Result<Verdict> {
    service.get_record(interview_id)?;
    let reading = match provider.verify(candidate_audio, reference_audio) {
        Ok(r) => r,
        Err(e) => {
            let neutral = neutral_reading(SignalKind::VoiceMatch, &e);
            VoiceReading { score: neutral.score, is_synthetic: false, flags: neutral.flags }
        }
    };
    service.record_voice_match(interview_id, reading.score, reading.flags, reading.is_synthetic)
}

pub fn run_ai_text_check(
    service: &AntifraudService,
    provider: &dyn AiTextProvider,
    interview_id: &str,
    text: &str,
) -> Result<Verdict> {
    service.get_record(interview_id)?;
    let reading = with_neutral_fallback(SignalKind::AiText, provider.detect(text));
    service.record_ai_text_score(interview_id, reading.score, reading.flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AntifraudConfig;
    use crate::error::AntifraudError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLiveness(f64);
    impl LivenessProvider for FixedLiveness {
        fn check(&self, _video: &[u8]) -> ProviderResult<SignalReading> {
            Ok(SignalReading::new(self.0).with_flag("spoofing_detected", false))
        }
    }

    struct DownFaceMatch;
    impl FaceMatchProvider for DownFaceMatch {
        fn verify(&self, _c: &[u8], _r: &[u8]) -> ProviderResult<SignalReading> {
            Err(ProviderError::Unavailable("face service 503".into()))
        }
    }

    struct SyntheticVoice;
    impl VoiceMatchProvider for SyntheticVoice {
        fn verify(&self, _c: &[u8], _r: &[u8]) -> ProviderResult<VoiceReading> {
            Ok(VoiceReading { score: 0.35, is_synthetic: true, flags: Default::default() })
        }
    }

    struct CountingDetector(AtomicUsize);
    impl AiTextProvider for CountingDetector {
        fn detect(&self, _text: &str) -> ProviderResult<SignalReading> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SignalReading::new(0.8))
        }
    }

    struct BrokenDetector;
    impl AiTextProvider for BrokenDetector {
        fn detect(&self, _text: &str) -> ProviderResult<SignalReading> {
            Ok(SignalReading::new(3.0))
        }
    }

    fn service() -> AntifraudService {
        let svc = AntifraudService::new(AntifraudConfig::default());
        svc.create_record("iv");
        svc
    }

    #[test]
    fn liveness_result_is_ingested() {
        let svc = service();
        run_liveness_check(&svc, &FixedLiveness(0.92), "iv", b"video").unwrap();
        let r = svc.get_record("iv").unwrap();
        assert_eq!(r.liveness_score, Some(0.92));
        assert_eq!(r.flags["liveness"]["spoofing_detected"], false);
    }

    #[test]
    fn unavailable_provider_falls_back_to_neutral() {
        let svc = service();
        let v = run_face_match_check(&svc, &DownFaceMatch, "iv", b"a", b"b").unwrap();
        let r = svc.get_record("iv").unwrap();
        assert_eq!(r.face_match_score, Some(NEUTRAL_SCORE));
        assert_eq!(r.flags["face_match"]["fallback"], true);
        assert!((v.overall_fraud_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn voice_synthetic_flag_is_propagated() {
        let svc = service();
        run_voice_check(&svc, &SyntheticVoice, "iv", b"a", b"b").unwrap();
        let r = svc.get_record("iv").unwrap();
        assert_eq!(r.voice_match_score, Some(0.35));
        assert_eq!(r.flags["synthetic_speech"], true);
    }

    #[test]
    fn provider_not_called_for_unknown_interview() {
        let svc = service();
        let detector = CountingDetector(AtomicUsize::new(0));
        let err = run_ai_text_check(&svc, &detector, "other", "answer").unwrap_err();
        assert!(matches!(err, AntifraudError::NotFound { .. }));
        assert_eq!(detector.0.load(Ordering::SeqCst), 0);

        run_ai_text_check(&svc, &detector, "iv", "answer").unwrap();
        assert_eq!(detector.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn out_of_range_provider_score_is_rejected() {
        let svc = service();
        let err = run_ai_text_check(&svc, &BrokenDetector, "iv", "answer").unwrap_err();
        assert!(matches!(err, AntifraudError::Validation(_)));
        assert_eq!(svc.get_record("iv").unwrap().text_ai_score, None);
    }
}
