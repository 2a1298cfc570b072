//! Deterministic synthetic chains for tests and benchmarks.
//!
//! No random number generator is used. Every value is computed from the
//! sample index alone, so the chains are reproducible bit for bit across
//! platforms.
//!
//! ## Noise model
//!
//! Parameter `p` of sample `i` receives low-discrepancy noise
//!
//! ```text
//! ε = σ × √12 × (frac(i × α_p) − ½)
//! ```
//!
//! with `α_p` drawn from a fixed list of irrational steps. The noise is
//! uniform with variance `σ²` and block means that stay far closer to zero
//! than pseudo-random draws would.
//!
//! ## Survey geometry
//!
//! Survey samples lie on one line of sight, evenly spaced between
//! `near_mpc` and `far_mpc`:
//!
//! ```text
//! d_i = near + (far − near) × (i + ½) / n
//! ```

use tensorcal_core::{Chain, Sample, SpatialTag, ValidationError};

/// Irrational steps of the noise streams (golden ratio, √2, √3, √5 fractional parts).
const NOISE_STEPS: [f64; 4] = [
    0.618_033_988_749_894_8,
    0.414_213_562_373_095_1,
    0.732_050_807_568_877_2,
    0.236_067_977_499_789_7,
];

/// Low-discrepancy noise with standard deviation `sigma`.
#[must_use]
pub fn quasi_noise(index: usize, stream: usize, sigma: f64) -> f64 {
    let step = NOISE_STEPS[stream % NOISE_STEPS.len()];
    let u = (index as f64 * step).fract();
    sigma * 12f64.sqrt() * (u - 0.5)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// True value and scatter of one synthetic parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticParameter {
    /// Parameter name
    pub name: String,
    /// Value the chain scatters around
    pub truth: f64,
    /// Standard deviation of the scatter
    pub sigma: f64,
}

impl SyntheticParameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, truth: f64, sigma: f64) -> Self {
        Self {
            name: name.into(),
            truth,
            sigma,
        }
    }
}

/// Bias injected into the first parameter of a survey chain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Systematic {
    /// No bias
    #[default]
    None,
    /// Same offset for every sample
    UniformOffset(f64),
    /// Square wave along the line of sight: `amplitude` on the first half of
    /// every wavelength, zero on the second half
    Periodic {
        /// Offset inside biased half-waves
        amplitude: f64,
        /// Physical wavelength in Mpc
        wavelength_mpc: f64,
    },
}

impl Systematic {
    /// Bias at a distance along the line of sight.
    #[must_use]
    pub fn bias_at(&self, distance_mpc: f64) -> f64 {
        match *self {
            Self::None => 0.0,
            Self::UniformOffset(offset) => offset,
            Self::Periodic {
                amplitude,
                wavelength_mpc,
            } => {
                if (distance_mpc / wavelength_mpc).fract() < 0.5 {
                    amplitude
                } else {
                    0.0
                }
            }
        }
    }
}

/// Configuration for [`survey_chain`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyConfig {
    /// Chain name. Default: **"survey"**.
    pub name: String,
    /// Parameters; the systematic applies to the first. Default: **H0 = 67.4 ± 1.0**.
    pub parameters: Vec<SyntheticParameter>,
    /// Number of samples. Default: **2000**.
    pub num_samples: usize,
    /// Right ascension of the line of sight. Default: **0°**.
    pub ra_deg: f64,
    /// Declination of the line of sight. Default: **0°**.
    pub dec_deg: f64,
    /// Nearest sample distance. Default: **109.375 Mpc**.
    pub near_mpc: f64,
    /// Far end of the line of sight. Default: **546.875 Mpc**.
    pub far_mpc: f64,
    /// Injected bias. Default: **none**.
    pub systematic: Systematic,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            name: "survey".into(),
            parameters: vec![SyntheticParameter::new("H0", 67.4, 1.0)],
            num_samples: 2000,
            ra_deg: 0.0,
            dec_deg: 0.0,
            near_mpc: 109.375,
            far_mpc: 546.875,
            systematic: Systematic::None,
        }
    }
}

impl SurveyConfig {
    /// Distance of sample `i`.
    #[must_use]
    pub fn distance(&self, index: usize) -> f64 {
        let span = self.far_mpc - self.near_mpc;
        self.near_mpc + span * (index as f64 + 0.5) / self.num_samples as f64
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Spatially tagged chain along one line of sight.
pub fn survey_chain(config: &SurveyConfig) -> Result<Chain, ValidationError> {
    let samples = (0..config.num_samples).map(|i| {
        let distance = config.distance(i);
        let values = config
            .parameters
            .iter()
            .enumerate()
            .map(|(p, param)| {
                let bias = if p == 0 {
                    config.systematic.bias_at(distance)
                } else {
                    0.0
                };
                param.truth + bias + quasi_noise(i, p, param.sigma)
            })
            .collect();
        Sample::new(values).with_spatial(SpatialTag::at_distance(
            config.ra_deg,
            config.dec_deg,
            distance,
        ))
    });

    Chain::builder(config.name.clone())
        .parameters(config.parameters.iter().map(|p| p.name.clone()))
        .samples(samples)
        .build()
}

/// Chain without spatial data.
pub fn reference_chain(
    name: &str,
    parameters: &[SyntheticParameter],
    num_samples: usize,
) -> Result<Chain, ValidationError> {
    let samples = (0..num_samples).map(|i| {
        Sample::new(
            parameters
                .iter()
                .enumerate()
                .map(|(p, param)| param.truth + quasi_noise(i, p, param.sigma))
                .collect(),
        )
    });

    Chain::builder(name)
        .parameters(parameters.iter().map(|p| p.name.clone()))
        .samples(samples)
        .build()
}
