//! Tensor extractor: chain + precision → [`ObserverTensor`].
//!
//! Extraction runs in three phases:
//!
//! 1. **Encode**: spatially tagged samples are split into fixed-size shards
//!    and encoded in parallel. Each shard folds its own ordered map of cell
//!    statistics.
//! 2. **Barrier**: all shards are collected.
//! 3. **Reduce**: shard maps are merged in shard order, so the floating-point
//!    result does not depend on thread scheduling.
//!
//! The spatial statistic is a one-way analysis of variance of every
//! parameter across populated cells. The intra-cell correlation `ρ` it
//! yields turns into a Kish design effect that inflates the posterior
//! variance: samples sharing a cell with a common offset carry less
//! independent information than their count suggests. Once a precision
//! resolves a position-dependent bias into separate cells, the inflated
//! variance absorbs the apparent disagreement.
//!
//! Offsets are only credited to the grid once they are spatially coherent:
//! at most `2 / K` of face-adjacent populated cell pairs may differ
//! significantly, `K` being the encoder's scale oversampling. A square-wave
//! bias of wavelength `S` meets this once cells shrink to about `S / K`,
//! which is the native precision of that scale.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tensorcal_core::constants::{EXCLUSION_WARNING_RATE, MIN_ENCODED_FRACTION};
use tensorcal_core::{Chain, Cosmology, EncodeError, ExtractionError, Sample, ValidationError};
use tracing::{debug, warn};

use crate::address::SpatialAddress;
use crate::encoder::SpatialEncoder;
use crate::moments::RunningMoments;
use crate::tensor::{ObserverTensor, ParameterSummary, SpatialMoments, TensorCounts};

/// Extractor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Fewer encoded / tagged samples than this fails the extraction
    pub min_encoded_fraction: f64,

    /// Exclusion rate above which a warning is logged
    pub exclusion_warning_rate: f64,

    /// Minimum mean samples per populated cell for estimating ρ
    pub min_mean_occupancy: f64,

    /// Standard deviations above 1 the between/within variance ratio must
    /// reach before ρ is taken as nonzero
    pub significance_sigmas: f64,

    /// Samples per encoding shard
    pub shard_size: usize,

    /// Below this many samples the shards are processed on the calling thread
    pub min_parallel_size: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_encoded_fraction: MIN_ENCODED_FRACTION,
            exclusion_warning_rate: EXCLUSION_WARNING_RATE,
            min_mean_occupancy: 2.0,
            significance_sigmas: 3.0,
            shard_size: 4096,
            min_parallel_size: 8192,
        }
    }
}

impl ExtractorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.min_encoded_fraction) {
            return Err(ValidationError::config(
                "min_encoded_fraction must be between 0 and 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.exclusion_warning_rate) {
            return Err(ValidationError::config(
                "exclusion_warning_rate must be between 0 and 1",
            ));
        }
        if !self.min_mean_occupancy.is_finite() || self.min_mean_occupancy < 1.0 {
            return Err(ValidationError::config(
                "min_mean_occupancy must be at least 1",
            ));
        }
        if !self.significance_sigmas.is_finite() || self.significance_sigmas < 0.0 {
            return Err(ValidationError::config(
                "significance_sigmas must be non-negative",
            ));
        }
        if self.shard_size == 0 {
            return Err(ValidationError::config("shard_size must be positive"));
        }
        Ok(())
    }
}

/// Cell statistics of one shard (or of the merged grid).
#[derive(Debug, Clone)]
struct CellGrid {
    cells: BTreeMap<u128, RunningMoments>,
    tagged: usize,
    out_of_range: usize,
    invalid: usize,
}

impl CellGrid {
    fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
            tagged: 0,
            out_of_range: 0,
            invalid: 0,
        }
    }

    fn encoded(&self) -> usize {
        self.cells.values().map(RunningMoments::count).sum()
    }

    fn merge(&mut self, other: CellGrid) {
        self.tagged += other.tagged;
        self.out_of_range += other.out_of_range;
        self.invalid += other.invalid;
        for (code, stats) in other.cells {
            self.cells
                .entry(code)
                .and_modify(|existing| existing.merge(&stats))
                .or_insert(stats);
        }
    }
}

/// Builds observer tensors from chains.
#[derive(Debug, Clone, Default)]
pub struct TensorExtractor {
    encoder: SpatialEncoder,
    config: ExtractorConfig,
}

impl TensorExtractor {
    /// Create an extractor.
    pub fn new(encoder: SpatialEncoder, config: ExtractorConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { encoder, config })
    }

    /// The encoder used for spatial placement.
    #[must_use]
    pub fn encoder(&self) -> &SpatialEncoder {
        &self.encoder
    }

    /// Extractor configuration.
    #[must_use]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Summarize `chain` at `precision`.
    ///
    /// Per-sample encoding failures are counted, not raised. The extraction
    /// fails only when the precision is unsupported or when too small a
    /// fraction of the spatially tagged samples could be encoded.
    pub fn extract(
        &self,
        chain: &Chain,
        cosmology: &Cosmology,
        precision: u8,
    ) -> Result<ObserverTensor, ExtractionError> {
        SpatialEncoder::check_precision(precision)?;

        let width = chain.schema().len();
        let mut posterior = RunningMoments::new(width);
        for sample in chain.samples() {
            posterior.push(sample.values());
        }

        let grid = self.encode_cells(chain.samples(), cosmology, precision, width);
        let encoded = grid.encoded();
        let excluded = grid.tagged - encoded;

        if grid.tagged > 0 {
            let exclusion_rate = excluded as f64 / grid.tagged as f64;
            if 1.0 - exclusion_rate < self.config.min_encoded_fraction {
                return Err(ExtractionError::InsufficientSamples {
                    chain: chain.name().to_string(),
                    precision,
                    encoded,
                    tagged: grid.tagged,
                    exclusion_rate,
                });
            }
            if exclusion_rate > self.config.exclusion_warning_rate {
                warn!(
                    chain = chain.name(),
                    precision,
                    excluded,
                    out_of_range = grid.out_of_range,
                    invalid = grid.invalid,
                    exclusion_rate,
                    "High sample exclusion rate"
                );
            }
        }

        let cells: Vec<&RunningMoments> = grid.cells.values().collect();
        let layout = CellLayout::new(&cells);
        let neighbours = face_neighbours(&grid.cells, precision);
        let variance = posterior.variance();

        let parameters = chain
            .schema()
            .iter()
            .enumerate()
            .map(|(p, name)| {
                let clustering = self.intra_cell_correlation(&cells, &layout, &neighbours, p);
                let design_effect = 1.0 + (layout.weighted_occupancy - 1.0) * clustering;
                ParameterSummary {
                    name: name.clone(),
                    mean: posterior.mean()[p],
                    variance: variance[p],
                    clustering,
                    design_effect,
                    effective_variance: variance[p] * design_effect,
                }
            })
            .collect();

        let spatial = layout.moments(&cells);

        debug!(
            chain = chain.name(),
            precision,
            cells = cells.len(),
            neighbour_pairs = neighbours.len(),
            encoded,
            excluded,
            "Extracted observer tensor"
        );

        Ok(ObserverTensor::new(
            chain.name().to_string(),
            precision,
            parameters,
            spatial,
            TensorCounts {
                samples: chain.len(),
                tagged: grid.tagged,
                encoded,
                excluded,
                cells: cells.len(),
            },
        ))
    }

    /// Encode every tagged sample and aggregate per cell.
    fn encode_cells(
        &self,
        samples: &[Sample],
        cosmology: &Cosmology,
        precision: u8,
        width: usize,
    ) -> CellGrid {
        let shard = |chunk: &[Sample]| -> CellGrid {
            let mut grid = CellGrid::new();
            for sample in chunk {
                let Some(tag) = sample.spatial() else {
                    continue;
                };
                grid.tagged += 1;
                match self.encoder.encode(tag, cosmology, precision) {
                    Ok(address) => grid
                        .cells
                        .entry(address.code())
                        .or_insert_with(|| RunningMoments::new(width))
                        .push(sample.values()),
                    Err(EncodeError::OutOfRange { .. }) => grid.out_of_range += 1,
                    Err(_) => grid.invalid += 1,
                }
            }
            grid
        };

        let shards: Vec<CellGrid> = if samples.len() < self.config.min_parallel_size {
            samples.chunks(self.config.shard_size).map(shard).collect()
        } else {
            samples.par_chunks(self.config.shard_size).map(shard).collect()
        };

        shards.into_iter().fold(CellGrid::new(), |mut acc, grid| {
            acc.merge(grid);
            acc
        })
    }

    /// One-way ANOVA estimate of the intra-cell correlation for parameter `p`.
    ///
    /// Zero unless the grid is resolved, cells hold enough samples on
    /// average, the between-cell mean square is significantly larger than
    /// the within-cell mean square, and the cell means are coherent across
    /// neighbouring cells.
    fn intra_cell_correlation(
        &self,
        cells: &[&RunningMoments],
        layout: &CellLayout,
        neighbours: &[CellPair<'_>],
        p: usize,
    ) -> f64 {
        let k = cells.len();
        let n = layout.total;
        if k < 2 || n <= k {
            return 0.0;
        }
        if (n as f64) / (k as f64) < self.config.min_mean_occupancy {
            return 0.0;
        }

        let total = n as f64;
        let grand = cells
            .iter()
            .map(|c| c.count() as f64 * c.mean()[p])
            .sum::<f64>()
            / total;
        let ssb: f64 = cells
            .iter()
            .map(|c| {
                let d = c.mean()[p] - grand;
                c.count() as f64 * d * d
            })
            .sum();
        let ssw: f64 = cells.iter().map(|c| c.m2()[p]).sum();

        let df_between = (k - 1) as f64;
        let df_within = (n - k) as f64;
        let msb = ssb / df_between;
        let msw = ssw / df_within;

        if msw > 0.0 {
            let critical = 1.0 + self.config.significance_sigmas * (2.0 / df_between).sqrt();
            if msb / msw <= critical {
                return 0.0;
            }
        } else if msb <= 0.0 {
            return 0.0;
        }

        if !self.is_coherent(neighbours, p, msw) {
            return 0.0;
        }
        if msw <= 0.0 {
            return 1.0;
        }

        // Effective cell size for unbalanced designs
        let n0 = (total - layout.sum_sq / total) / df_between;
        if n0 <= 0.0 {
            return 0.0;
        }
        let between = ((msb - msw) / n0).max(0.0);
        (between / (between + msw)).clamp(0.0, 1.0)
    }

    /// Whether the cell means of parameter `p` change between few enough
    /// neighbouring cells for the pattern to count as resolved.
    fn is_coherent(&self, neighbours: &[CellPair<'_>], p: usize, msw: f64) -> bool {
        if neighbours.is_empty() {
            return false;
        }
        let z = self.config.significance_sigmas;
        let discordant = neighbours
            .iter()
            .filter(|(a, b)| {
                let d = a.mean()[p] - b.mean()[p];
                let se2 = msw * (1.0 / a.count() as f64 + 1.0 / b.count() as f64);
                d * d > z * z * se2
            })
            .count();
        let tolerance = 2.0 / self.encoder.config().scale_oversampling;
        (discordant as f64) <= tolerance * neighbours.len() as f64
    }
}

/// Two populated cells sharing a face.
type CellPair<'a> = (&'a RunningMoments, &'a RunningMoments);

/// Face-adjacent pairs of populated cells, each pair listed once in code order.
fn face_neighbours(cells: &BTreeMap<u128, RunningMoments>, precision: u8) -> Vec<CellPair<'_>> {
    let limit = 1u64 << precision;
    let mut pairs = Vec::new();
    for (&code, stats) in cells {
        let axes = SpatialAddress::from_code(code, precision).axes();
        for k in 0..3 {
            if axes[k] + 1 >= limit {
                continue;
            }
            let mut next = axes;
            next[k] += 1;
            let Ok(address) = SpatialAddress::from_axes(next, precision) else {
                continue;
            };
            if let Some(other) = cells.get(&address.code()) {
                pairs.push((stats, other));
            }
        }
    }
    pairs
}

/// Occupancy figures shared by every parameter.
struct CellLayout {
    total: usize,
    sum_sq: f64,
    weighted_occupancy: f64,
}

impl CellLayout {
    fn new(cells: &[&RunningMoments]) -> Self {
        let total: usize = cells.iter().map(|c| c.count()).sum();
        let sum_sq: f64 = cells
            .iter()
            .map(|c| {
                let n = c.count() as f64;
                n * n
            })
            .sum();
        let weighted_occupancy = if total > 0 {
            sum_sq / total as f64
        } else {
            1.0
        };
        Self {
            total,
            sum_sq,
            weighted_occupancy,
        }
    }

    fn moments(&self, cells: &[&RunningMoments]) -> SpatialMoments {
        let k = cells.len();
        if k < 2 {
            return SpatialMoments::NEUTRAL;
        }
        let total = self.total as f64;
        let entropy: f64 = cells
            .iter()
            .map(|c| {
                let share = c.count() as f64 / total;
                -share * share.ln()
            })
            .sum();
        SpatialMoments {
            resolved: true,
            occupancy_ratio: k as f64 / total,
            evenness: entropy / (k as f64).ln(),
            mean_occupancy: self.weighted_occupancy,
        }
    }
}
