//! Flat ΛCDM background cosmology.
//!
//! A [`Cosmology`] is validated once at construction and never mutated.
//! Every chain in a calibration run carries its own cosmology so that two
//! programs analysed under different fiducial models can still be placed on
//! the same comoving grid.

use serde::{Deserialize, Serialize};

use crate::constants::{FLATNESS_TOLERANCE, SPEED_OF_LIGHT_KM_S};
use crate::error::ValidationError;

/// Number of Simpson intervals used for the comoving distance integral.
const INTEGRATION_STEPS: usize = 512;

/// Validated cosmological parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CosmologyParams", into = "CosmologyParams")]
pub struct Cosmology {
    h0: f64,
    omega_m: f64,
    omega_lambda: f64,
}

/// Unvalidated wire form used by serde.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CosmologyParams {
    h0: f64,
    omega_m: f64,
    omega_lambda: f64,
}

impl TryFrom<CosmologyParams> for Cosmology {
    type Error = ValidationError;

    fn try_from(p: CosmologyParams) -> Result<Self, Self::Error> {
        Cosmology::new(p.h0, p.omega_m, p.omega_lambda)
    }
}

impl From<Cosmology> for CosmologyParams {
    fn from(c: Cosmology) -> Self {
        Self {
            h0: c.h0,
            omega_m: c.omega_m,
            omega_lambda: c.omega_lambda,
        }
    }
}

impl Cosmology {
    /// Create a validated cosmology.
    ///
    /// `h0` is in km/s/Mpc and must lie in `(40, 100)`. Both density
    /// parameters must lie in `(0, 1)` and sum to one within
    /// [`FLATNESS_TOLERANCE`].
    pub fn new(h0: f64, omega_m: f64, omega_lambda: f64) -> Result<Self, ValidationError> {
        if !h0.is_finite() || h0 <= 40.0 || h0 >= 100.0 {
            return Err(ValidationError::InvalidCosmology {
                parameter: "h0",
                value: h0,
                reason: "must lie in (40, 100) km/s/Mpc",
            });
        }
        if !omega_m.is_finite() || omega_m <= 0.0 || omega_m >= 1.0 {
            return Err(ValidationError::InvalidCosmology {
                parameter: "omega_m",
                value: omega_m,
                reason: "must lie in (0, 1)",
            });
        }
        if !omega_lambda.is_finite() || omega_lambda <= 0.0 || omega_lambda >= 1.0 {
            return Err(ValidationError::InvalidCosmology {
                parameter: "omega_lambda",
                value: omega_lambda,
                reason: "must lie in (0, 1)",
            });
        }
        let total = omega_m + omega_lambda;
        if (total - 1.0).abs() > FLATNESS_TOLERANCE {
            return Err(ValidationError::InvalidCosmology {
                parameter: "omega_m + omega_lambda",
                value: total,
                reason: "flat universe required",
            });
        }

        Ok(Self {
            h0,
            omega_m,
            omega_lambda,
        })
    }

    /// Flat cosmology with `Ω_Λ = 1 − Ω_m`.
    pub fn flat(h0: f64, omega_m: f64) -> Result<Self, ValidationError> {
        Self::new(h0, omega_m, 1.0 - omega_m)
    }

    /// Planck 2018 TT,TE,EE+lowE+lensing.
    #[must_use]
    pub fn planck2018() -> Self {
        Self {
            h0: 67.36,
            omega_m: 0.315,
            omega_lambda: 0.685,
        }
    }

    /// SH0ES distance-ladder fiducial.
    #[must_use]
    pub fn shoes() -> Self {
        Self {
            h0: 73.04,
            omega_m: 0.300,
            omega_lambda: 0.700,
        }
    }

    /// Hubble constant in km/s/Mpc.
    #[must_use]
    pub fn h0(&self) -> f64 {
        self.h0
    }

    /// Matter density parameter.
    #[must_use]
    pub fn omega_m(&self) -> f64 {
        self.omega_m
    }

    /// Dark energy density parameter.
    #[must_use]
    pub fn omega_lambda(&self) -> f64 {
        self.omega_lambda
    }

    /// Hubble distance `c / H0` in Mpc.
    #[must_use]
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / self.h0
    }

    /// Dimensionless expansion rate `E(z) = H(z) / H0`.
    #[must_use]
    pub fn e_of_z(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        (self.omega_m * zp1 * zp1 * zp1 + self.omega_lambda).sqrt()
    }

    /// Line-of-sight comoving distance to redshift `z` in Mpc.
    ///
    /// Returns 0 for `z <= 0`.
    #[must_use]
    pub fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 || !z.is_finite() {
            return 0.0;
        }

        // Composite Simpson rule on 1/E(z)
        let h = z / INTEGRATION_STEPS as f64;
        let mut sum = 1.0 / self.e_of_z(0.0) + 1.0 / self.e_of_z(z);
        for i in 1..INTEGRATION_STEPS {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight / self.e_of_z(i as f64 * h);
        }

        self.hubble_distance() * sum * h / 3.0
    }

    /// Luminosity distance `(1 + z) D_C` in Mpc.
    #[must_use]
    pub fn luminosity_distance(&self, z: f64) -> f64 {
        (1.0 + z.max(0.0)) * self.comoving_distance(z)
    }

    /// Angular diameter distance `D_C / (1 + z)` in Mpc.
    #[must_use]
    pub fn angular_diameter_distance(&self, z: f64) -> f64 {
        self.comoving_distance(z) / (1.0 + z.max(0.0))
    }
}

impl Default for Cosmology {
    fn default() -> Self {
        Self::planck2018()
    }
}

/// Redshift to scale factor, `a = 1 / (1 + z)`.
#[must_use]
pub fn redshift_to_scale_factor(z: f64) -> f64 {
    1.0 / (1.0 + z)
}

/// Scale factor to redshift, `z = 1/a − 1`. `a` must lie in `(0, 1]`.
#[must_use]
pub fn scale_factor_to_redshift(a: f64) -> f64 {
    1.0 / a - 1.0
}
