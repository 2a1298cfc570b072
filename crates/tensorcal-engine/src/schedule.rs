//! Resolution schedules and per-precision scale information.
//!
//! A schedule is a strictly increasing list of precisions the controller
//! walks through. Presets cover the common cases from galaxy clusters down
//! to stellar neighbourhoods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tensorcal_core::constants::{HORIZON_LENGTH_MPC, MAX_PRECISION, MIN_PRECISION};
use tensorcal_core::ValidationError;

/// Validated, strictly increasing sequence of precisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct ResolutionSchedule {
    precisions: Vec<u8>,
}

impl ResolutionSchedule {
    /// Create a schedule.
    ///
    /// The list must be non-empty, within `MIN_PRECISION..=MAX_PRECISION` and
    /// strictly increasing (which also rules out duplicates).
    pub fn new(precisions: Vec<u8>) -> Result<Self, ValidationError> {
        if precisions.is_empty() {
            return Err(ValidationError::schedule("schedule is empty"));
        }
        if let Some(&p) = precisions
            .iter()
            .find(|p| !(MIN_PRECISION..=MAX_PRECISION).contains(*p))
        {
            return Err(ValidationError::schedule(format!(
                "precision {p} outside {MIN_PRECISION}..={MAX_PRECISION}"
            )));
        }
        if let Some(w) = precisions.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ValidationError::schedule(format!(
                "precisions must be strictly increasing, found {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(Self { precisions })
    }

    /// Every `step`-th precision from `start` to `end` inclusive.
    pub fn range(start: u8, end: u8, step: u8) -> Result<Self, ValidationError> {
        if step == 0 {
            return Err(ValidationError::schedule("step must be positive"));
        }
        Self::new((start..=end).step_by(usize::from(step)).collect())
    }

    /// Schedule for a named preset.
    #[must_use]
    pub fn preset(preset: SchedulePreset) -> Self {
        Self {
            precisions: preset.precisions(),
        }
    }

    /// Precisions in evaluation order.
    #[must_use]
    pub fn precisions(&self) -> &[u8] {
        &self.precisions
    }

    /// Iterate precisions in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.precisions.iter().copied()
    }

    /// Number of precisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.precisions.len()
    }

    /// Always `false`; schedules cannot be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.precisions.is_empty()
    }

    /// Coarsest and finest precision.
    #[must_use]
    pub fn span(&self) -> (u8, u8) {
        let first = self.precisions.first().copied().unwrap_or(MIN_PRECISION);
        let last = self.precisions.last().copied().unwrap_or(first);
        (first, last)
    }

    /// Upper bound on sample encodings for a full run over `total_samples`
    /// samples (both chains combined).
    #[must_use]
    pub fn estimated_cost(&self, total_samples: usize) -> u64 {
        total_samples as u64 * self.precisions.len() as u64
    }
}

impl TryFrom<Vec<u8>> for ResolutionSchedule {
    type Error = ValidationError;

    fn try_from(precisions: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(precisions)
    }
}

impl From<ResolutionSchedule> for Vec<u8> {
    fn from(schedule: ResolutionSchedule) -> Self {
        schedule.precisions
    }
}

impl Default for ResolutionSchedule {
    fn default() -> Self {
        Self::preset(SchedulePreset::Full)
    }
}

/// Named schedule presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePreset {
    /// 8 to 32 in steps of 4
    Full,
    /// 8 to 24 in steps of 4
    Short,
    /// 8 to 28 in steps of 4
    Conservative,
    /// 8 to 32 in steps of 2
    Aggressive,
    /// 8, 16, 24, 32
    Coarse,
}

impl SchedulePreset {
    /// All presets.
    pub const ALL: [SchedulePreset; 5] = [
        Self::Full,
        Self::Short,
        Self::Conservative,
        Self::Aggressive,
        Self::Coarse,
    ];

    /// Precisions for this preset.
    #[must_use]
    pub fn precisions(self) -> Vec<u8> {
        let (end, step) = match self {
            Self::Full => (32, 4),
            Self::Short => (24, 4),
            Self::Conservative => (28, 4),
            Self::Aggressive => (32, 2),
            Self::Coarse => (32, 8),
        };
        (8..=end).step_by(step).collect()
    }

    /// Preset name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Short => "short",
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
            Self::Coarse => "coarse",
        }
    }
}

impl fmt::Display for SchedulePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchedulePreset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::schedule(format!("unknown schedule preset '{s}'")))
    }
}

/// Astrophysical regime a cell size probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleCategory {
    /// ≥ 10 Mpc
    Supercluster,
    /// 1–10 Mpc
    Cluster,
    /// 50 kpc – 1 Mpc
    Group,
    /// 3–50 kpc
    Galaxy,
    /// 200 pc – 3 kpc
    Subgalactic,
    /// 10–200 pc
    StellarCluster,
    /// < 10 pc
    StellarNeighborhood,
}

impl ScaleCategory {
    /// Category for a cell edge length in Mpc.
    #[must_use]
    pub fn from_cell_size(cell_size_mpc: f64) -> Self {
        match cell_size_mpc {
            s if s >= 10.0 => Self::Supercluster,
            s if s >= 1.0 => Self::Cluster,
            s if s >= 0.05 => Self::Group,
            s if s >= 0.003 => Self::Galaxy,
            s if s >= 2e-4 => Self::Subgalactic,
            s if s >= 1e-5 => Self::StellarCluster,
            _ => Self::StellarNeighborhood,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Supercluster => "Supercluster",
            Self::Cluster => "Cluster",
            Self::Group => "Group",
            Self::Galaxy => "Galaxy",
            Self::Subgalactic => "Subgalactic",
            Self::StellarCluster => "Stellar cluster",
            Self::StellarNeighborhood => "Stellar neighborhood",
        }
    }

    /// Systematic effects typically resolved at this scale.
    #[must_use]
    pub fn systematic_effects(self) -> &'static str {
        match self {
            Self::Supercluster => "None (cosmological scales)",
            Self::Cluster => "Peculiar velocities, bulk flows",
            Self::Group => "Large-scale structure, bulk flows",
            Self::Galaxy => "Metallicity gradients, galaxy peculiar velocities",
            Self::Subgalactic => "Dust extinction, reddening, stellar populations",
            Self::StellarCluster => "Population mixing, local extinction variations",
            Self::StellarNeighborhood => "Individual stellar properties, local environment",
        }
    }
}

impl fmt::Display for ScaleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical description of one precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionInfo {
    /// Bits per axis
    pub precision: u8,
    /// Cell edge length in Mpc
    pub cell_size_mpc: f64,
    /// Cell edge length in kpc
    pub cell_size_kpc: f64,
    /// Cell edge length in pc
    pub cell_size_pc: f64,
    /// Cells along each axis
    pub cells_per_axis: u64,
    /// Bits in an address
    pub address_bits: u32,
    /// Astrophysical regime
    pub category: ScaleCategory,
    /// Systematics expected at this scale
    pub systematic_effects: &'static str,
}

impl ResolutionInfo {
    /// Describe `precision` with the default horizon length.
    #[must_use]
    pub fn for_precision(precision: u8) -> Self {
        Self::with_horizon(precision, HORIZON_LENGTH_MPC)
    }

    /// Describe `precision` for a custom horizon length in Mpc.
    #[must_use]
    pub fn with_horizon(precision: u8, horizon_length_mpc: f64) -> Self {
        let precision = precision.min(MAX_PRECISION);
        let cell_size_mpc = horizon_length_mpc / 2f64.powi(i32::from(precision));
        let category = ScaleCategory::from_cell_size(cell_size_mpc);
        Self {
            precision,
            cell_size_mpc,
            cell_size_kpc: cell_size_mpc * 1e3,
            cell_size_pc: cell_size_mpc * 1e6,
            cells_per_axis: 1u64 << precision,
            address_bits: 3 * u32::from(precision),
            category,
            systematic_effects: category.systematic_effects(),
        }
    }
}
