use crate::target::TargetError;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Reasons a run halts. None of these are retried inside a run; the target's
/// step pointer is the recovery anchor and re-invoking resumes from it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpgradeError {
    #[error("Failed to read target state: {0}")]
    Read(#[source] TargetError),

    #[error(
        "{condition} did not converge within {elapsed_ms}ms ({attempts} polls, last observed: {})",
        .last_observed.as_deref().unwrap_or("nothing")
    )]
    ConvergenceTimeout {
        condition: String,
        elapsed_ms: u64,
        attempts: u32,
        last_observed: Option<String>,
    },

    #[error("Assertion failed for {property}: expected {expected}, got {actual}")]
    AssertionFailed {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot encode transaction {function}: {reason}")]
    Encoding { function: String, reason: String },

    #[error("Controller call {function} failed: {reason}")]
    Submit { function: String, reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl UpgradeError {
    pub fn assertion(property: impl Into<String>, expected: impl ToString, actual: impl ToString) -> Self {
        UpgradeError::AssertionFailed {
            property: property.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether re-invoking the sequence later may succeed without operator changes
    pub fn is_resumable(&self) -> bool {
        matches!(self, UpgradeError::ConvergenceTimeout { .. })
    }
}

/// Reports carry the rendered message
impl Serialize for UpgradeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<TargetError> for UpgradeError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::Encoding { function, reason } => UpgradeError::Encoding { function, reason },
            TargetError::SubmitFailed { function, reason } => UpgradeError::Submit { function, reason },
            other => UpgradeError::Read(other),
        }
    }
}
