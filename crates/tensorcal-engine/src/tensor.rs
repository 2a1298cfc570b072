//! Observer tensors: fixed-length summaries of a chain at one precision.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Components contributed by each parameter: mean, effective variance,
/// intra-cell correlation.
pub const COMPONENTS_PER_PARAMETER: usize = 3;

/// Trailing components: resolved flag, occupancy ratio, evenness,
/// log mean occupancy, precision.
pub const TRAILING_COMPONENTS: usize = 5;

/// Summary of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Parameter name
    pub name: String,
    /// Posterior mean over all samples
    pub mean: f64,
    /// Posterior variance over all samples
    pub variance: f64,
    /// Intra-cell correlation ρ in `[0, 1]`
    pub clustering: f64,
    /// Kish design effect `1 + (m − 1)ρ`
    pub design_effect: f64,
    /// Posterior variance inflated by the design effect
    pub effective_variance: f64,
}

/// How the encoded samples spread over cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialMoments {
    /// At least two populated cells
    pub resolved: bool,
    /// Populated cells per encoded sample, `(0, 1]`
    pub occupancy_ratio: f64,
    /// Normalized Shannon entropy of the cell occupancy distribution
    pub evenness: f64,
    /// Size-weighted mean occupancy `Σ n_c² / n`
    pub mean_occupancy: f64,
}

impl SpatialMoments {
    /// Value used for chains without spatial data and for degenerate grids.
    pub const NEUTRAL: SpatialMoments = SpatialMoments {
        resolved: false,
        occupancy_ratio: 0.0,
        evenness: 0.0,
        mean_occupancy: 1.0,
    };
}

/// Sample bookkeeping for one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TensorCounts {
    /// All samples in the chain
    pub samples: usize,
    /// Samples carrying a spatial tag
    pub tagged: usize,
    /// Tagged samples placed in a cell
    pub encoded: usize,
    /// Tagged samples that could not be placed
    pub excluded: usize,
    /// Populated cells
    pub cells: usize,
}

/// Immutable summary of a chain at one precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverTensor {
    chain: String,
    precision: u8,
    parameters: Vec<ParameterSummary>,
    spatial: SpatialMoments,
    counts: TensorCounts,
}

impl ObserverTensor {
    pub(crate) fn new(
        chain: String,
        precision: u8,
        parameters: Vec<ParameterSummary>,
        spatial: SpatialMoments,
        counts: TensorCounts,
    ) -> Self {
        Self {
            chain,
            precision,
            parameters,
            spatial,
            counts,
        }
    }

    /// Name of the source chain.
    #[must_use]
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Precision the tensor was extracted at.
    #[must_use]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Per-parameter summaries in schema order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSummary] {
        &self.parameters
    }

    /// Summary for a named parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameter names in schema order.
    pub fn schema(&self) -> impl Iterator<Item = &str> + '_ {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Whether two tensors describe the same parameter schema.
    #[must_use]
    pub fn same_schema(&self, other: &ObserverTensor) -> bool {
        self.schema().eq(other.schema())
    }

    /// Spatial distribution statistics.
    #[must_use]
    pub fn spatial(&self) -> &SpatialMoments {
        &self.spatial
    }

    /// Sample bookkeeping.
    #[must_use]
    pub fn counts(&self) -> &TensorCounts {
        &self.counts
    }

    /// Length of [`ObserverTensor::components`].
    #[must_use]
    pub fn dimension(&self) -> usize {
        COMPONENTS_PER_PARAMETER * self.parameters.len() + TRAILING_COMPONENTS
    }

    /// Flattened numeric form.
    #[must_use]
    pub fn components(&self) -> Array1<f64> {
        let mut values = Vec::with_capacity(self.dimension());
        for p in &self.parameters {
            values.extend([p.mean, p.effective_variance, p.clustering]);
        }
        values.extend([
            if self.spatial.resolved { 1.0 } else { 0.0 },
            self.spatial.occupancy_ratio,
            self.spatial.evenness,
            self.spatial.mean_occupancy.ln(),
            f64::from(self.precision),
        ]);
        Array1::from(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(spatial: SpatialMoments) -> ObserverTensor {
        ObserverTensor::new(
            "t".into(),
            8,
            vec![ParameterSummary {
                name: "H0".into(),
                mean: 70.0,
                variance: 1.0,
                clustering: 0.5,
                design_effect: 2.0,
                effective_variance: 2.0,
            }],
            spatial,
            TensorCounts::default(),
        )
    }

    #[test]
    fn test_components_layout() {
        let t = tensor(SpatialMoments::NEUTRAL);
        let c = t.components();
        assert_eq!(c.len(), t.dimension());
        assert_eq!(c.to_vec(), vec![70.0, 2.0, 0.5, 0.0, 0.0, 0.0, 0.0, 8.0]);
    }

    #[test]
    fn test_schema_helpers() {
        let a = tensor(SpatialMoments::NEUTRAL);
        let b = tensor(SpatialMoments {
            resolved: true,
            occupancy_ratio: 0.1,
            evenness: 0.9,
            mean_occupancy: 10.0,
        });
        assert!(a.same_schema(&b));
        assert_eq!(a.schema().collect::<Vec<_>>(), vec!["H0"]);
        assert!(a.parameter("H0").is_some());
        assert!(a.parameter("S8").is_none());
    }
}
