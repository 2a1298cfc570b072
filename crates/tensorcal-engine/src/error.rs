//! Error types for calibration runs.
//!
//! - [`CalibrationError`]: top-level error returned by the controller and
//!   every fallible public operation of this crate.
//!
//! An exhausted schedule is a valid negative result and is never reported
//! through this type; neither is cancellation.

use thiserror::Error;

use tensorcal_core::{DistanceError, EncodeError, ExtractionError, ValidationError};

use crate::result::{ResolutionStep, RunStatus};

/// Top-level calibration error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CalibrationError {
    /// Inputs rejected before the first step
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Tensor extraction failed
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Tensors could not be compared
    #[error("Distance error: {0}")]
    Distance(#[from] DistanceError),

    /// A resolution step failed; the run ended in the `Failed` state
    #[error("Run failed at precision {precision} after {} completed steps: {source}", .completed.len())]
    RunFailed {
        /// Precision of the failing step
        precision: u8,
        /// Steps finished before the failure
        completed: Vec<ResolutionStep>,
        /// Underlying cause
        #[source]
        source: Box<CalibrationError>,
    },

    /// Illegal run-state transition
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the attempted transition
        from: RunStatus,
        /// Requested state
        to: RunStatus,
    },
}

impl From<EncodeError> for CalibrationError {
    fn from(err: EncodeError) -> Self {
        Self::Extraction(ExtractionError::Encode(err))
    }
}

impl CalibrationError {
    /// Creates a step failure wrapping `source`.
    #[must_use]
    pub fn run_failed(
        precision: u8,
        completed: Vec<ResolutionStep>,
        source: impl Into<CalibrationError>,
    ) -> Self {
        Self::RunFailed {
            precision,
            completed,
            source: Box::new(source.into()),
        }
    }

    /// Whether the error was raised before any step ran.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Innermost error for a failed run, or `self`.
    #[must_use]
    pub fn root_cause(&self) -> &CalibrationError {
        match self {
            Self::RunFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for calibration operations
pub type Result<T> = std::result::Result<T, CalibrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_display_and_root() {
        let inner = ExtractionError::InsufficientSamples {
            chain: "sne".into(),
            precision: 12,
            encoded: 10,
            tagged: 100,
            exclusion_rate: 0.9,
        };
        let err = CalibrationError::run_failed(12, Vec::new(), inner.clone());
        assert!(err
            .to_string()
            .starts_with("Run failed at precision 12 after 0 completed steps"));
        assert!(matches!(
            err.root_cause(),
            CalibrationError::Extraction(e) if *e == inner
        ));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_encode_error_conversion() {
        let err: CalibrationError = EncodeError::MissingRadialCoordinate.into();
        assert!(matches!(
            err,
            CalibrationError::Extraction(ExtractionError::Encode(_))
        ));
    }
}
