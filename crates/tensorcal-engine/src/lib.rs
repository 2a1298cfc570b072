//! Multi-resolution spatial-tensor calibration engine.
//!
//! Two measurement programs that disagree on a parameter (the Hubble
//! constant, typically) are compared at progressively finer spatial
//! resolutions. At each precision every sample is assigned to a 3-D Morton
//! cell, each chain is reduced to an observer tensor whose variances are
//! inflated by intra-cell correlation, and the epistemic distance ΔT between
//! the two tensors is measured. The run stops at the first precision where
//! ΔT falls below the threshold τ.
//!
//! ```text
//!  Chain A ──┐                                   ┌── Chain B
//!            ▼                                   ▼
//!     SpatialEncoder ── precision N ──▶   SpatialEncoder
//!            │                                   │
//!      TensorExtractor                     TensorExtractor
//!            │        ObserverTensor × 2         │
//!            └──────────▶ EpistemicDistance ◀────┘
//!                               │ ΔT
//!                    ConvergenceController
//!                  ΔT < τ ? Converged : next N
//! ```
//!
//! # Example
//!
//! ```rust
//! use tensorcal_engine::prelude::*;
//! use tensorcal_engine::synthetic::{reference_chain, survey_chain, SurveyConfig, SyntheticParameter};
//!
//! let cmb = reference_chain("cmb", &[SyntheticParameter::new("H0", 67.4, 0.5)], 1000).unwrap();
//! let survey = survey_chain(&SurveyConfig::default()).unwrap();
//! let cosmology = Cosmology::planck2018();
//!
//! let controller = ConvergenceController::default();
//! let schedule = ResolutionSchedule::new(vec![8, 12, 16]).unwrap();
//! let result = controller
//!     .run(&cmb, &survey, &cosmology, &cosmology, &schedule)
//!     .unwrap();
//!
//! assert!(result.is_converged());
//! assert!(result.merged.is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod cache;
pub mod config;
pub mod controller;
pub mod decomposition;
pub mod distance;
pub mod encoder;
pub mod error;
pub mod extractor;
pub mod moments;
pub mod result;
pub mod schedule;
pub mod synthetic;
pub mod tension;
pub mod tensor;

pub use tensorcal_core;

pub use address::SpatialAddress;
pub use cache::{CachedController, InMemoryResultCache, InputDigest, ResultCache};
pub use config::{CalibrationConfig, CalibrationConfigBuilder};
pub use controller::{
    CancellationToken, ConvergenceController, MeasurementProgram, PairwiseResult,
};
pub use decomposition::{decompose, dominant_scale, ScaleContribution};
pub use distance::{
    compute_delta_t, parameter_gaps, parameter_tensions, DistanceConfig, EpistemicDistance,
};
pub use encoder::{EncoderConfig, SpatialEncoder};
pub use error::{CalibrationError, Result};
pub use extractor::{ExtractorConfig, TensorExtractor};
pub use result::{
    ConvergenceResult, MergedEstimate, MergedParameter, ResolutionStep, RunStatus, VarianceKind,
};
pub use schedule::{ResolutionInfo, ResolutionSchedule, ScaleCategory, SchedulePreset};
pub use tension::{tension_sigma, MonotonicConvergence, TensionReduction};
pub use tensor::{ObserverTensor, ParameterSummary, SpatialMoments, TensorCounts};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CalibrationConfig;
    pub use crate::controller::{CancellationToken, ConvergenceController, MeasurementProgram};
    pub use crate::error::{CalibrationError, Result};
    pub use crate::result::{ConvergenceResult, MergedEstimate, ResolutionStep, RunStatus};
    pub use crate::schedule::{ResolutionSchedule, SchedulePreset};
    pub use crate::tensor::ObserverTensor;
    pub use tensorcal_core::prelude::*;
}
