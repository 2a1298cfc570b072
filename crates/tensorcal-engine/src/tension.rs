//! Classical tension diagnostics.
//!
//! These complement ΔT with the figures practitioners usually quote: the
//! Gaussian tension in σ between two measurements, how much a calibration
//! reduced it, and whether a sequence of estimates settles monotonically.

use serde::{Deserialize, Serialize};

/// Tension below which two measurements are considered consistent.
pub const CONSISTENCY_SIGMA: f64 = 2.0;

/// Gaussian tension `|v1 − v2| / sqrt(σ1² + σ2²)`.
///
/// Returns 0 for identical values and infinity for distinct values with
/// zero combined uncertainty.
#[must_use]
pub fn tension_sigma(value_1: f64, sigma_1: f64, value_2: f64, sigma_2: f64) -> f64 {
    let diff = (value_1 - value_2).abs();
    let combined = (sigma_1 * sigma_1 + sigma_2 * sigma_2).sqrt();
    if combined > 0.0 {
        diff / combined
    } else if diff == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Before/after comparison of a tension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionReduction {
    /// Tension before calibration in σ
    pub initial_sigma: f64,
    /// Tension after calibration in σ
    pub final_sigma: f64,
    /// Absolute reduction in σ
    pub reduction_sigma: f64,
    /// Reduction as a percentage of the initial tension
    pub reduction_percent: f64,
    /// Final tension below [`CONSISTENCY_SIGMA`]
    pub consistent: bool,
}

impl TensionReduction {
    /// Compare an initial and final tension in σ.
    #[must_use]
    pub fn evaluate(initial_sigma: f64, final_sigma: f64) -> Self {
        let reduction_sigma = initial_sigma - final_sigma;
        let reduction_percent = if initial_sigma > 0.0 {
            100.0 * reduction_sigma / initial_sigma
        } else {
            0.0
        };
        Self {
            initial_sigma,
            final_sigma,
            reduction_sigma,
            reduction_percent,
            consistent: final_sigma < CONSISTENCY_SIGMA,
        }
    }
}

/// Monotonic approach of a sequence toward a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonotonicConvergence {
    /// Distance to the target never increased
    pub monotonic: bool,
    /// Last value lies within tolerance of the target
    pub reached_target: bool,
    /// Indices `i` where `|x_i − target| > |x_{i−1} − target|`
    pub violations: Vec<usize>,
}

impl MonotonicConvergence {
    /// Check whether `values` approach `target` without backtracking.
    ///
    /// `tolerance` is both the slack allowed on each step and the distance at
    /// which the target counts as reached.
    #[must_use]
    pub fn check(values: &[f64], target: f64, tolerance: f64) -> Self {
        let violations: Vec<usize> = values
            .windows(2)
            .enumerate()
            .filter(|(_, w)| (w[1] - target).abs() > (w[0] - target).abs() + tolerance)
            .map(|(i, _)| i + 1)
            .collect();
        let reached_target = values
            .last()
            .is_some_and(|last| (last - target).abs() <= tolerance);
        Self {
            monotonic: violations.is_empty(),
            reached_target,
            violations,
        }
    }
}
