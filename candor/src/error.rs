// candor/src/error.rs

use thiserror::Error;

use crate::events::InterviewId;

#[derive(Debug, Error)]
pub enum AntifraudError {
    /// No record exists for this interview. Records are never auto-created.
    #[error("no fraud record for interview {interview_id}")]
    NotFound { interview_id: InterviewId },

    /// Rejected input; the record was left untouched.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl AntifraudError {
    pub fn not_found(interview_id: &str) -> Self {
        Self::NotFound { interview_id: interview_id.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, AntifraudError>;

/// Checks that a signal score is a finite value in [0,1].
pub fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AntifraudError::Validation(format!(
            "{} must be within [0,1], got {}",
            name, value
        )))
    }
}
