//! Systematic decomposition of a convergence history.
//!
//! Attributes the reduction in ΔT to the physical scales at which it
//! happened. Purely a read-only view of a finished run.

use serde::{Deserialize, Serialize};

use crate::result::{MergedEstimate, ResolutionStep, VarianceKind};
use crate::schedule::ScaleCategory;

/// Contribution of one precision to resolving the disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleContribution {
    /// Bits per axis
    pub precision: u8,
    /// Cell edge length in Mpc
    pub physical_scale_mpc: f64,
    /// Astrophysical regime of the cell size
    pub scale_category: ScaleCategory,
    /// ΔT at this step
    pub delta_t: f64,
    /// `ΔT_prev − ΔT`; zero for the first step
    pub improvement_over_previous: f64,
    /// Share of the total ΔT reduction across the history
    pub fraction_of_total: f64,
    /// Change of each merged parameter value relative to the previous step
    pub parameter_shift: Vec<f64>,
}

/// Break a history down by scale.
///
/// The first step's parameter shift is measured against the merge that
/// ignores spatial structure entirely, so a disagreement already absorbed
/// at the coarsest precision still shows up.
#[must_use]
pub fn decompose(history: &[ResolutionStep]) -> Vec<ScaleContribution> {
    let Some(first) = history.first() else {
        return Vec::new();
    };

    let total = (first.delta_t - history[history.len() - 1].delta_t).max(0.0);
    let mut previous_delta = first.delta_t;
    let mut previous_merge =
        MergedEstimate::from_tensors(&first.tensor_a, &first.tensor_b, VarianceKind::Posterior);

    history
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let merge =
                MergedEstimate::from_tensors(&step.tensor_a, &step.tensor_b, VarianceKind::Effective);
            let improvement = if index == 0 {
                0.0
            } else {
                previous_delta - step.delta_t
            };
            let parameter_shift = merge
                .parameters
                .iter()
                .zip(&previous_merge.parameters)
                .map(|(now, before)| now.value - before.value)
                .collect();

            previous_delta = step.delta_t;
            previous_merge = merge;

            ScaleContribution {
                precision: step.precision,
                physical_scale_mpc: step.cell_size_mpc,
                scale_category: ScaleCategory::from_cell_size(step.cell_size_mpc),
                delta_t: step.delta_t,
                improvement_over_previous: improvement,
                fraction_of_total: if total > 0.0 { improvement / total } else { 0.0 },
                parameter_shift,
            }
        })
        .collect()
}

/// Contribution with the largest ΔT improvement.
#[must_use]
pub fn dominant_scale(contributions: &[ScaleContribution]) -> Option<&ScaleContribution> {
    contributions
        .iter()
        .filter(|c| c.improvement_over_previous > 0.0)
        .max_by(|a, b| a.improvement_over_previous.total_cmp(&b.improvement_over_previous))
}
