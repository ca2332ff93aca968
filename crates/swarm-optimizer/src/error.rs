//! Error types for the optimization engine

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Optimization engine errors
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// Job descriptor rejected at submission
    #[error("Invalid job descriptor: {message}")]
    InvalidDescriptor {
        /// What was wrong with the descriptor
        message: String,
    },

    /// Algorithm-specific parameter outside its documented range
    #[error("Invalid hyperparameter for {algorithm}: {name} = {value} ({message})")]
    InvalidHyperparameter {
        /// Algorithm the parameter belongs to
        algorithm: String,
        /// Parameter name
        name: String,
        /// Offending value
        value: f64,
        /// Accepted range
        message: String,
    },

    /// Candidate dimensionality disagrees with the bounds or objective
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality declared by the bounds
        expected: usize,
        /// Dimensionality actually seen
        actual: usize,
    },

    /// Objective evaluation failed after all retries (strict mode)
    #[error("Evaluation failed: {reason}")]
    EvaluationFailed {
        /// Reason reported by the objective
        reason: String,
    },

    /// Unknown job handle
    #[error("Job not found: {job_id}")]
    JobNotFound {
        /// Requested job
        job_id: Uuid,
    },

    /// Engine configuration error
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description
        message: String,
    },

    /// Tracing initialisation error
    #[error("Telemetry error: {message}")]
    Telemetry {
        /// Description
        message: String,
    },

    /// Agent profile store error
    #[error("Profile store error: {message}")]
    Profile {
        /// Description
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OptimizerError {
    pub(crate) fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_hyperparameter(
        algorithm: &str,
        name: &str,
        value: f64,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidHyperparameter {
            algorithm: algorithm.to_string(),
            name: name.to_string(),
            value,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for optimization engine operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Category of a terminal job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// A strategy step rejected its hyperparameters
    InvalidHyperparameter,
    /// Candidate dimensionality disagreed with the bounds
    DimensionMismatch,
    /// Objective evaluation kept failing in strict mode
    EvaluationFailed,
    /// Any other run-time error
    Internal,
}

/// Structured cause attached to a `Failed` job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCause {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl From<&OptimizerError> for FailureCause {
    fn from(error: &OptimizerError) -> Self {
        let kind = match error {
            OptimizerError::InvalidHyperparameter { .. } => FailureKind::InvalidHyperparameter,
            OptimizerError::DimensionMismatch { .. } => FailureKind::DimensionMismatch,
            OptimizerError::EvaluationFailed { .. } => FailureKind::EvaluationFailed,
            _ => FailureKind::Internal,
        };

        Self {
            kind,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_cause_from_error() {
        let error = OptimizerError::invalid_hyperparameter("DE", "F", 3.0, "must be in (0, 2]");
        let cause = FailureCause::from(&error);
        assert_eq!(cause.kind, FailureKind::InvalidHyperparameter);
        assert!(cause.message.contains("F = 3"));

        let error = OptimizerError::DimensionMismatch {
            expected: 2,
            actual: 3,
        };
        assert_eq!(FailureCause::from(&error).kind, FailureKind::DimensionMismatch);

        let error = OptimizerError::invalid_configuration("bad");
        assert_eq!(FailureCause::from(&error).kind, FailureKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let error = OptimizerError::invalid_descriptor("population size must be at least 2");
        assert_eq!(
            error.to_string(),
            "Invalid job descriptor: population size must be at least 2"
        );
    }
}
