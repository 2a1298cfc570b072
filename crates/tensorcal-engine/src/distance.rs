//! Epistemic distance ΔT between two observer tensors.
//!
//! ```text
//! z_p   = (μ_a,p − μ_b,p) / sqrt(V_a,p + V_b,p)      effective variances
//! χ²_ν  = (1/P) Σ_p z_p²
//! s²    = (occ_a − occ_b)² + (even_a − even_b)²    both tensors resolved
//! ΔT    = 1 − exp(−(χ²_ν + w·s²) / 2)
//! ```
//!
//! ΔT is zero for identical tensors, symmetric, dimensionless, and
//! unchanged by affine rescaling of any parameter. It is evaluated on the
//! flattened [`ObserverTensor::components`] of both tensors.

use ndarray::s;
use serde::{Deserialize, Serialize};
use tensorcal_core::{DistanceError, ValidationError};

use crate::tensor::{ObserverTensor, COMPONENTS_PER_PARAMETER};

/// Default weight of the spatial-distribution term.
pub const DEFAULT_SPATIAL_WEIGHT: f64 = 0.1;

/// Distance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// Weight of the spatial-distribution term relative to the parameter term
    pub spatial_weight: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            spatial_weight: DEFAULT_SPATIAL_WEIGHT,
        }
    }
}

impl DistanceConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.spatial_weight.is_finite() || self.spatial_weight < 0.0 {
            return Err(ValidationError::config(
                "spatial_weight must be non-negative",
            ));
        }
        Ok(())
    }
}

/// ΔT calculator.
#[derive(Debug, Clone, Default)]
pub struct EpistemicDistance {
    config: DistanceConfig,
}

impl EpistemicDistance {
    /// Create a calculator.
    pub fn new(config: DistanceConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// ΔT in `[0, 1]`.
    ///
    /// Returns 1 when some parameter differs while both effective variances
    /// are zero.
    pub fn compute(&self, a: &ObserverTensor, b: &ObserverTensor) -> Result<f64, DistanceError> {
        check_compatible(a, b)?;
        let (ca, cb) = (a.components(), b.components());
        let count = a.parameters().len();
        let width = COMPONENTS_PER_PARAMETER * count;
        let stride = COMPONENTS_PER_PARAMETER as isize;

        let diff = &ca.slice(s![0..width; stride]) - &cb.slice(s![0..width; stride]);
        let combined = &ca.slice(s![1..width; stride]) + &cb.slice(s![1..width; stride]);

        let mut chi2 = 0.0;
        for (d, v) in diff.iter().zip(combined.iter()) {
            if *v > 0.0 {
                chi2 += d * d / v;
            } else if *d != 0.0 {
                return Ok(1.0);
            }
        }
        chi2 /= count.max(1) as f64;

        // Trailing block: resolved flag, occupancy ratio, evenness, ...
        let (ta, tb) = (ca.slice(s![width..]), cb.slice(s![width..]));
        let spatial = if ta[0] > 0.0 && tb[0] > 0.0 {
            let occupancy = ta[1] - tb[1];
            let evenness = ta[2] - tb[2];
            occupancy * occupancy + evenness * evenness
        } else {
            0.0
        };

        let exponent = 0.5 * (chi2 + self.config.spatial_weight * spatial);
        Ok(1.0 - (-exponent).exp())
    }
}

/// ΔT with the default configuration.
pub fn compute_delta_t(a: &ObserverTensor, b: &ObserverTensor) -> Result<f64, DistanceError> {
    EpistemicDistance::default().compute(a, b)
}

/// Per-parameter tension `|μ_a − μ_b| / sqrt(V_a + V_b)` in standard
/// deviations, using effective variances.
///
/// Infinite when the means differ and both variances are zero.
pub fn parameter_tensions(
    a: &ObserverTensor,
    b: &ObserverTensor,
) -> Result<Vec<f64>, DistanceError> {
    check_compatible(a, b)?;

    Ok(a.parameters()
        .iter()
        .zip(b.parameters())
        .map(|(pa, pb)| {
            let diff = (pa.mean - pb.mean).abs();
            let combined = pa.effective_variance + pb.effective_variance;
            if combined > 0.0 {
                diff / combined.sqrt()
            } else if diff == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        })
        .collect())
}

/// Absolute difference of posterior means per parameter, in parameter units.
pub fn parameter_gaps(a: &ObserverTensor, b: &ObserverTensor) -> Result<Vec<f64>, DistanceError> {
    check_compatible(a, b)?;
    Ok(a.parameters()
        .iter()
        .zip(b.parameters())
        .map(|(pa, pb)| (pa.mean - pb.mean).abs())
        .collect())
}

fn check_compatible(a: &ObserverTensor, b: &ObserverTensor) -> Result<(), DistanceError> {
    if a.precision() != b.precision() {
        return Err(DistanceError::mismatch(
            "precision",
            a.precision(),
            b.precision(),
        ));
    }
    if a.dimension() != b.dimension() {
        return Err(DistanceError::mismatch(
            "dimension",
            a.dimension(),
            b.dimension(),
        ));
    }
    if !a.same_schema(b) {
        return Err(DistanceError::mismatch(
            "schema",
            a.schema().collect::<Vec<_>>().join(","),
            b.schema().collect::<Vec<_>>().join(","),
        ));
    }
    Ok(())
}
