//! Error types shared across the calibration engine.
//!
//! # Error Hierarchy
//!
//! - [`ValidationError`]: malformed inputs rejected before any work starts
//! - [`EncodeError`]: a single sample could not be placed on the grid; these
//!   are recovered per sample and counted as exclusions
//! - [`ExtractionError`]: a whole chain could not be summarized at a precision
//! - [`DistanceError`]: two tensors cannot be compared
//!
//! The engine crate wraps all of these in its own `CalibrationError`.

use thiserror::Error;

/// Input validation failures. None of these are retryable: the caller has to
/// fix the input.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Resolution schedule is empty, out of range, or not strictly increasing
    #[error("Invalid resolution schedule: {reason}")]
    InvalidSchedule {
        /// What is wrong with the schedule
        reason: String,
    },

    /// Convergence threshold outside `(0, 1)`
    #[error("Invalid convergence threshold {value}: must lie in (0, 1)")]
    InvalidThreshold {
        /// Offending threshold
        value: f64,
    },

    /// Chain shorter than the minimum sample count
    #[error("Chain '{chain}' has {count} samples, at least {minimum} required")]
    InsufficientSamples {
        /// Chain name
        chain: String,
        /// Number of samples supplied
        count: usize,
        /// Required minimum
        minimum: usize,
    },

    /// The two chains do not share a parameter schema
    #[error("Chains '{chain_a}' and '{chain_b}' have different parameter schemas: {schema_a:?} vs {schema_b:?}")]
    SchemaMismatch {
        /// First chain name
        chain_a: String,
        /// Second chain name
        chain_b: String,
        /// Parameters of the first chain
        schema_a: Vec<String>,
        /// Parameters of the second chain
        schema_b: Vec<String>,
    },

    /// Cosmological parameter outside its physical range
    #[error("Invalid cosmology: {parameter} = {value} ({reason})")]
    InvalidCosmology {
        /// Parameter name
        parameter: &'static str,
        /// Offending value
        value: f64,
        /// Expected range or constraint
        reason: &'static str,
    },

    /// Structurally malformed chain
    #[error("Invalid chain '{chain}': {message}")]
    InvalidChain {
        /// Chain name
        chain: String,
        /// Description of the defect
        message: String,
    },

    /// A parameter value is NaN or infinite
    #[error("Chain '{chain}' sample {sample}: parameter '{parameter}' is not finite")]
    NonFiniteValue {
        /// Chain name
        chain: String,
        /// Sample index
        sample: usize,
        /// Parameter name
        parameter: String,
    },

    /// Multi-program runs need at least two programs
    #[error("At least two measurement programs are required, got {count}")]
    TooFewPrograms {
        /// Number of programs supplied
        count: usize,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem
        message: String,
    },
}

impl ValidationError {
    /// Creates a new schedule error.
    #[must_use]
    pub fn schedule(reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            reason: reason.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a new chain error.
    #[must_use]
    pub fn chain(chain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidChain {
            chain: chain.into(),
            message: message.into(),
        }
    }
}

/// Per-sample encoding failures.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum EncodeError {
    /// Normalized coordinate fell outside `[0, 1)` on some axis
    #[error("Position outside the encoded horizon on axis {axis} (normalized {normalized})")]
    OutOfRange {
        /// Axis index (0 = x, 1 = y, 2 = z)
        axis: usize,
        /// Normalized coordinate that failed the range check
        normalized: f64,
    },

    /// A spatial field is outside its valid domain
    #[error("Invalid coordinate: {field} = {value}")]
    InvalidCoordinate {
        /// Field name
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// Neither a distance nor a scale factor was supplied
    #[error("Sample has no distance or scale factor to place it radially")]
    MissingRadialCoordinate,

    /// Precision outside the supported range
    #[error("Precision {precision} outside supported range {min}..={max}")]
    InvalidPrecision {
        /// Requested precision
        precision: u8,
        /// Lowest supported precision
        min: u8,
        /// Highest supported precision
        max: u8,
    },
}

impl EncodeError {
    /// Returns `true` for failures that only concern the individual sample.
    #[must_use]
    pub fn is_per_sample(&self) -> bool {
        !matches!(self, Self::InvalidPrecision { .. })
    }
}

/// Failures while summarizing a chain at one precision.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExtractionError {
    /// Too many spatially tagged samples were excluded
    #[error(
        "Chain '{chain}' at precision {precision}: only {encoded} of {tagged} spatial samples encoded \
         (exclusion rate {exclusion_rate:.3})"
    )]
    InsufficientSamples {
        /// Chain name
        chain: String,
        /// Precision being extracted
        precision: u8,
        /// Samples that encoded successfully
        encoded: usize,
        /// Samples carrying spatial data
        tagged: usize,
        /// Fraction of tagged samples excluded
        exclusion_rate: f64,
    },

    /// Precision could not be used for encoding
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
}

/// Failures comparing two tensors.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DistanceError {
    /// Tensors differ in precision, schema or length
    #[error("Tensor dimension mismatch in {what}: {left} vs {right}")]
    DimensionMismatch {
        /// Which property differs
        what: &'static str,
        /// Value on the left tensor
        left: String,
        /// Value on the right tensor
        right: String,
    },
}

impl DistanceError {
    /// Creates a new dimension mismatch error.
    #[must_use]
    pub fn mismatch(what: &'static str, left: impl ToString, right: impl ToString) -> Self {
        Self::DimensionMismatch {
            what,
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}
