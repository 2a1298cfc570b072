//! Run status, per-step history and calibrated result types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tension::{tension_sigma, MonotonicConvergence, TensionReduction};
use crate::tensor::ObserverTensor;
use tensorcal_core::constants::NEW_PHYSICS_THRESHOLD;

/// Lifecycle state of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Steps are being evaluated
    Running,
    /// ΔT fell below the threshold
    Converged,
    /// Every precision was evaluated without converging
    Exhausted,
    /// A step raised an error
    Failed,
    /// Stopped by the caller between steps
    Cancelled,
}

impl RunStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether `next` is a legal successor state.
    #[must_use]
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        self == Self::Running && next != Self::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Converged => "CONVERGED",
            Self::Exhausted => "EXHAUSTED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One evaluated precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStep {
    /// Bits per axis
    pub precision: u8,
    /// Cell edge length in Mpc
    pub cell_size_mpc: f64,
    /// Tensor of the first chain
    pub tensor_a: ObserverTensor,
    /// Tensor of the second chain
    pub tensor_b: ObserverTensor,
    /// Epistemic distance between the two tensors
    pub delta_t: f64,
    /// Populated cells of the first chain
    pub n_cells_a: usize,
    /// Populated cells of the second chain
    pub n_cells_b: usize,
    /// Samples of the first chain excluded from encoding
    pub excluded_a: usize,
    /// Samples of the second chain excluded from encoding
    pub excluded_b: usize,
    /// Per-parameter `|μ_a − μ_b|` in parameter units
    pub gap: Vec<f64>,
    /// Per-parameter tension in σ using effective variances
    pub tension_sigma: Vec<f64>,
    /// ΔT below the run threshold
    pub converged: bool,
}

/// Which variance a merge weights by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceKind {
    /// Posterior variance, ignoring spatial structure
    Posterior,
    /// Posterior variance inflated by the design effect
    Effective,
}

/// Calibrated estimate of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedParameter {
    /// Parameter name
    pub name: String,
    /// Inverse-variance weighted value
    pub value: f64,
    /// One-sigma uncertainty
    pub uncertainty: f64,
    /// `value − uncertainty`
    pub interval_low: f64,
    /// `value + uncertainty`
    pub interval_high: f64,
    /// Weight of the first chain
    pub weight_a: f64,
    /// Weight of the second chain
    pub weight_b: f64,
}

/// Calibrated estimate of every parameter at one precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEstimate {
    /// Precision whose tensors were merged
    pub precision: u8,
    /// Per-parameter estimates in schema order
    pub parameters: Vec<MergedParameter>,
}

impl MergedEstimate {
    /// Inverse-variance combination of two same-schema tensors.
    ///
    /// A parameter with zero variance on one side takes that side's mean;
    /// zero on both sides takes the midpoint.
    #[must_use]
    pub fn from_tensors(a: &ObserverTensor, b: &ObserverTensor, kind: VarianceKind) -> Self {
        let parameters = a
            .parameters()
            .iter()
            .zip(b.parameters())
            .map(|(pa, pb)| {
                let (va, vb) = match kind {
                    VarianceKind::Posterior => (pa.variance, pb.variance),
                    VarianceKind::Effective => (pa.effective_variance, pb.effective_variance),
                };
                let (weight_a, value, uncertainty) = if va > 0.0 && vb > 0.0 {
                    let (wa, wb) = (1.0 / va, 1.0 / vb);
                    let weight_a = wa / (wa + wb);
                    let value = (pa.mean * wa + pb.mean * wb) / (wa + wb);
                    (weight_a, value, (1.0 / (wa + wb)).sqrt())
                } else if va <= 0.0 && vb <= 0.0 {
                    (0.5, 0.5 * (pa.mean + pb.mean), 0.0)
                } else if va <= 0.0 {
                    (1.0, pa.mean, 0.0)
                } else {
                    (0.0, pb.mean, 0.0)
                };
                MergedParameter {
                    name: pa.name.clone(),
                    value,
                    uncertainty,
                    interval_low: value - uncertainty,
                    interval_high: value + uncertainty,
                    weight_a,
                    weight_b: 1.0 - weight_a,
                }
            })
            .collect();

        Self {
            precision: a.precision(),
            parameters,
        }
    }

    /// Estimate for a named parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&MergedParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Outcome of one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    /// Terminal state
    pub status: RunStatus,
    /// Convergence threshold τ
    pub threshold: f64,
    /// Precisions requested
    pub schedule_used: Vec<u8>,
    /// Evaluated steps in ascending precision
    pub history: Vec<ResolutionStep>,
    /// Calibrated estimate; absent for cancelled runs
    pub merged: Option<MergedEstimate>,
    /// First precision with ΔT below τ
    pub converged_precision: Option<u8>,
    /// ΔT of the step the result is based on
    pub final_delta_t: Option<f64>,
}

impl ConvergenceResult {
    /// Whether the run converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == RunStatus::Converged
    }

    /// Whether the schedule ran out without converging.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.status == RunStatus::Exhausted
    }

    /// Exhausted with a residual ΔT above [`NEW_PHYSICS_THRESHOLD`]: the
    /// disagreement did not behave like a resolvable systematic.
    #[must_use]
    pub fn likely_fundamental(&self) -> bool {
        self.is_exhausted() && self.final_delta_t.is_some_and(|d| d > NEW_PHYSICS_THRESHOLD)
    }

    /// ΔT per evaluated step.
    #[must_use]
    pub fn delta_t_trace(&self) -> Vec<f64> {
        self.history.iter().map(|s| s.delta_t).collect()
    }

    /// Step the merged estimate is based on: the converged step, otherwise
    /// the last evaluated one.
    #[must_use]
    pub fn terminal_step(&self) -> Option<&ResolutionStep> {
        match self.converged_precision {
            Some(p) => self.history.iter().find(|s| s.precision == p),
            None => self.history.last(),
        }
    }

    /// Whether ΔT decreased toward zero step by step, allowing a slack of τ.
    #[must_use]
    pub fn delta_t_convergence(&self) -> MonotonicConvergence {
        MonotonicConvergence::check(&self.delta_t_trace(), 0.0, self.threshold)
    }

    /// Tension of `parameter` before calibration (first step, posterior
    /// variances) against after (terminal step, effective variances).
    #[must_use]
    pub fn tension_reduction(&self, parameter: &str) -> Option<TensionReduction> {
        let first = self.history.first()?;
        let last = self.terminal_step()?;
        let (ia, ib) = (first.tensor_a.parameter(parameter)?, first.tensor_b.parameter(parameter)?);
        let (fa, fb) = (last.tensor_a.parameter(parameter)?, last.tensor_b.parameter(parameter)?);

        let initial = tension_sigma(ia.mean, ia.variance.sqrt(), ib.mean, ib.variance.sqrt());
        let fin = tension_sigma(
            fa.mean,
            fa.effective_variance.sqrt(),
            fb.mean,
            fb.effective_variance.sqrt(),
        );
        Some(TensionReduction::evaluate(initial, fin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{ParameterSummary, SpatialMoments, TensorCounts};
    use approx::assert_relative_eq;

    fn tensor(mean: f64, variance: f64, design_effect: f64) -> ObserverTensor {
        ObserverTensor::new(
            "t".into(),
            8,
            vec![ParameterSummary {
                name: "H0".into(),
                mean,
                variance,
                clustering: 0.0,
                design_effect,
                effective_variance: variance * design_effect,
            }],
            SpatialMoments::NEUTRAL,
            TensorCounts::default(),
        )
    }

    #[test]
    fn test_transitions() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Converged));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Converged.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Cancelled.is_terminal());
        assert_eq!(RunStatus::Exhausted.to_string(), "EXHAUSTED");
    }

    #[test]
    fn test_inverse_variance_merge() {
        let a = tensor(67.0, 1.0, 1.0);
        let b = tensor(73.0, 4.0, 1.0);
        let m = MergedEstimate::from_tensors(&a, &b, VarianceKind::Posterior);
        let h0 = m.parameter("H0").unwrap();
        assert_relative_eq!(h0.value, (67.0 + 73.0 / 4.0) / 1.25, epsilon = 1e-12);
        assert_relative_eq!(h0.uncertainty, (1.0f64 / 1.25).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(h0.weight_a, 0.8, epsilon = 1e-12);
        assert_relative_eq!(
            h0.interval_high - h0.interval_low,
            2.0 * h0.uncertainty,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_effective_merge_downweights_clustered_chain() {
        let a = tensor(67.0, 1.0, 1.0);
        let b = tensor(73.0, 1.0, 99.0);
        let posterior = MergedEstimate::from_tensors(&a, &b, VarianceKind::Posterior);
        let effective = MergedEstimate::from_tensors(&a, &b, VarianceKind::Effective);
        assert_relative_eq!(posterior.parameters[0].value, 70.0, epsilon = 1e-12);
        assert_relative_eq!(effective.parameters[0].value, 67.06, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_variance_merge() {
        let a = tensor(1.0, 0.0, 1.0);
        let b = tensor(3.0, 2.0, 1.0);
        let m = MergedEstimate::from_tensors(&a, &b, VarianceKind::Effective);
        assert_eq!(m.parameters[0].value, 1.0);
        assert_eq!(m.parameters[0].uncertainty, 0.0);

        let c = tensor(3.0, 0.0, 1.0);
        let m = MergedEstimate::from_tensors(&a, &c, VarianceKind::Effective);
        assert_eq!(m.parameters[0].value, 2.0);
    }
}
