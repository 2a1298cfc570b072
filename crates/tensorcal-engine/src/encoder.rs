//! Spatial encoder: sample position → cell address at a precision.
//!
//! Positions are converted to comoving Cartesian coordinates, normalized
//! into the unit cube `[0, 1)^3` centred on the observer, quantized to `N`
//! bits per axis and interleaved into a [`SpatialAddress`].
//!
//! Scaling by `2^N` is exact in floating point, so the quantized coordinate
//! at precision `N` is the top `N` bits of the coordinate at any `M > N` and
//! encoding is hierarchically nested by construction.

use serde::{Deserialize, Serialize};
use tensorcal_core::constants::{
    HORIZON_LENGTH_MPC, MAX_PRECISION, MIN_PRECISION, SCALE_OVERSAMPLING,
};
use tensorcal_core::{scale_factor_to_redshift, Cosmology, EncodeError, SpatialTag, ValidationError};

use crate::address::SpatialAddress;

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Side length of the encoded cube in comoving Mpc
    pub horizon_length_mpc: f64,

    /// Oversampling factor between a physical scale and its native cell size
    pub scale_oversampling: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            horizon_length_mpc: HORIZON_LENGTH_MPC,
            scale_oversampling: SCALE_OVERSAMPLING,
        }
    }
}

impl EncoderConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.horizon_length_mpc.is_finite() || self.horizon_length_mpc <= 0.0 {
            return Err(ValidationError::config(
                "horizon_length_mpc must be positive",
            ));
        }
        if !self.scale_oversampling.is_finite() || self.scale_oversampling < 1.0 {
            return Err(ValidationError::config(
                "scale_oversampling must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Deterministic, stateless spatial encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEncoder {
    config: EncoderConfig,
}

impl Default for SpatialEncoder {
    fn default() -> Self {
        Self {
            config: EncoderConfig::default(),
        }
    }
}

impl SpatialEncoder {
    /// Create an encoder from a validated configuration.
    pub fn new(config: EncoderConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Encoder configuration.
    #[must_use]
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Horizon length in Mpc.
    #[must_use]
    pub fn horizon_length(&self) -> f64 {
        self.config.horizon_length_mpc
    }

    /// Reject precisions outside the supported range.
    pub fn check_precision(precision: u8) -> Result<(), EncodeError> {
        if (MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            Ok(())
        } else {
            Err(EncodeError::InvalidPrecision {
                precision,
                min: MIN_PRECISION,
                max: MAX_PRECISION,
            })
        }
    }

    /// Encode a tagged sample at `precision` bits per axis.
    pub fn encode(
        &self,
        tag: &SpatialTag,
        cosmology: &Cosmology,
        precision: u8,
    ) -> Result<SpatialAddress, EncodeError> {
        Self::check_precision(precision)?;
        let position = self.comoving_position(tag, cosmology)?;
        self.encode_position(position, precision)
    }

    /// Encode a comoving Cartesian position in Mpc.
    pub fn encode_position(
        &self,
        position: [f64; 3],
        precision: u8,
    ) -> Result<SpatialAddress, EncodeError> {
        Self::check_precision(precision)?;
        let unit = self.normalize(position)?;
        let scale = (1u64 << precision) as f64;

        let mut axes = [0u64; 3];
        for (q, u) in axes.iter_mut().zip(unit) {
            *q = (u * scale).floor() as u64;
        }
        SpatialAddress::from_axes(axes, precision)
    }

    /// Comoving Cartesian position of a tagged sample in Mpc.
    ///
    /// A luminosity distance takes precedence and is converted with the
    /// sample's scale factor (default 1). Without a distance the comoving
    /// distance at `z = 1/a − 1` is integrated in the supplied cosmology.
    pub fn comoving_position(
        &self,
        tag: &SpatialTag,
        cosmology: &Cosmology,
    ) -> Result<[f64; 3], EncodeError> {
        if !tag.ra_deg.is_finite() || !(0.0..360.0).contains(&tag.ra_deg) {
            return Err(EncodeError::InvalidCoordinate {
                field: "ra_deg",
                value: tag.ra_deg,
            });
        }
        if !tag.dec_deg.is_finite() || !(-90.0..=90.0).contains(&tag.dec_deg) {
            return Err(EncodeError::InvalidCoordinate {
                field: "dec_deg",
                value: tag.dec_deg,
            });
        }
        if let Some(a) = tag.scale_factor {
            if !a.is_finite() || a <= 0.0 || a > 1.0 {
                return Err(EncodeError::InvalidCoordinate {
                    field: "scale_factor",
                    value: a,
                });
            }
        }

        let radial = match (tag.distance_mpc, tag.scale_factor) {
            (Some(d), a) => {
                if !d.is_finite() || d <= 0.0 {
                    return Err(EncodeError::InvalidCoordinate {
                        field: "distance_mpc",
                        value: d,
                    });
                }
                d * a.unwrap_or(1.0)
            }
            (None, Some(a)) => {
                let z = scale_factor_to_redshift(a);
                if !z.is_finite() {
                    return Err(EncodeError::InvalidCoordinate {
                        field: "scale_factor",
                        value: a,
                    });
                }
                cosmology.comoving_distance(z)
            }
            (None, None) => return Err(EncodeError::MissingRadialCoordinate),
        };

        let ra = tag.ra_deg.to_radians();
        let dec = tag.dec_deg.to_radians();
        Ok([
            radial * dec.cos() * ra.cos(),
            radial * dec.cos() * ra.sin(),
            radial * dec.sin(),
        ])
    }

    /// Map a comoving position into the unit cube.
    pub fn normalize(&self, position: [f64; 3]) -> Result<[f64; 3], EncodeError> {
        let mut unit = [0.0; 3];
        for (axis, (u, x)) in unit.iter_mut().zip(position).enumerate() {
            let normalized = x / self.config.horizon_length_mpc + 0.5;
            if !(0.0..1.0).contains(&normalized) {
                return Err(EncodeError::OutOfRange { axis, normalized });
            }
            *u = normalized;
        }
        Ok(unit)
    }

    /// Edge length in Mpc of a cell at `precision`.
    #[must_use]
    pub fn cell_size(&self, precision: u8) -> f64 {
        self.config.horizon_length_mpc / 2f64.powi(i32::from(precision))
    }

    /// Smallest supported precision whose cells are no larger than `cell_size_mpc`.
    #[must_use]
    pub fn precision_for_cell_size(&self, cell_size_mpc: f64) -> u8 {
        if !cell_size_mpc.is_finite() || cell_size_mpc <= 0.0 {
            return MAX_PRECISION;
        }
        let bits = (self.config.horizon_length_mpc / cell_size_mpc).log2().ceil();
        bits.clamp(f64::from(MIN_PRECISION), f64::from(MAX_PRECISION)) as u8
    }

    /// Precision at which a physical scale is resolved by
    /// `scale_oversampling` cells.
    #[must_use]
    pub fn native_precision(&self, scale_mpc: f64) -> u8 {
        self.precision_for_cell_size(scale_mpc / self.config.scale_oversampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn encoder() -> SpatialEncoder {
        SpatialEncoder::default()
    }

    #[test]
    fn test_cell_size() {
        let enc = encoder();
        assert_relative_eq!(enc.cell_size(8), 14_000.0 / 256.0);
        assert_relative_eq!(enc.cell_size(4), 875.0);
    }

    #[test]
    fn test_native_precision() {
        let enc = encoder();
        // 109.375 Mpc / 20 → 14000 / 5.46875 = 2560 → ceil(log2) = 12
        assert_eq!(enc.native_precision(109.375), 12);
        assert_eq!(enc.precision_for_cell_size(1e9), MIN_PRECISION);
        assert_eq!(enc.precision_for_cell_size(1e-12), MAX_PRECISION);
        assert_eq!(enc.precision_for_cell_size(0.0), MAX_PRECISION);
    }

    #[test]
    fn test_observer_is_cube_centre() {
        let enc = encoder();
        let addr = enc.encode_position([0.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(addr.axes(), [8, 8, 8]);
    }

    #[test]
    fn test_out_of_range() {
        let enc = encoder();
        let err = enc.encode_position([7_000.0, 0.0, 0.0], 8).unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { axis: 0, .. }));
        let err = enc.encode_position([0.0, -7_000.1, 0.0], 8).unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { axis: 1, .. }));
        assert!(enc.encode_position([-7_000.0, 0.0, 0.0], 8).is_ok());
    }

    #[test]
    fn test_invalid_precision() {
        let enc = encoder();
        assert!(matches!(
            enc.encode_position([0.0; 3], 3),
            Err(EncodeError::InvalidPrecision { .. })
        ));
        assert!(enc.encode_position([0.0; 3], 41).is_err());
    }

    #[test]
    fn test_comoving_position_axes() {
        let enc = encoder();
        let cosmo = Cosmology::planck2018();
        let p = enc
            .comoving_position(&SpatialTag::at_distance(0.0, 0.0, 100.0), &cosmo)
            .unwrap();
        assert_eq!(p, [100.0, 0.0, 0.0]);

        let p = enc
            .comoving_position(&SpatialTag::at_distance(90.0, 0.0, 100.0), &cosmo)
            .unwrap();
        assert_relative_eq!(p[1], 100.0, epsilon = 1e-9);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-9);

        let p = enc
            .comoving_position(&SpatialTag::at_distance(10.0, 90.0, 100.0), &cosmo)
            .unwrap();
        assert_relative_eq!(p[2], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_luminosity_distance_converted_with_scale_factor() {
        let enc = encoder();
        let cosmo = Cosmology::planck2018();
        let tag = SpatialTag::at_distance(0.0, 0.0, 200.0).with_scale_factor(0.5);
        let p = enc.comoving_position(&tag, &cosmo).unwrap();
        assert_relative_eq!(p[0], 100.0);
    }

    #[test]
    fn test_scale_factor_only_uses_cosmology() {
        let enc = encoder();
        let cosmo = Cosmology::planck2018();
        let tag = SpatialTag::new(0.0, 0.0).with_scale_factor(0.5);
        let p = enc.comoving_position(&tag, &cosmo).unwrap();
        assert_relative_eq!(p[0], cosmo.comoving_distance(1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_coordinates() {
        let enc = encoder();
        let cosmo = Cosmology::planck2018();
        let cases = [
            (SpatialTag::at_distance(360.0, 0.0, 10.0), "ra_deg"),
            (SpatialTag::at_distance(0.0, 91.0, 10.0), "dec_deg"),
            (SpatialTag::at_distance(0.0, 0.0, -1.0), "distance_mpc"),
            (
                SpatialTag::at_distance(0.0, 0.0, 10.0).with_scale_factor(1.5),
                "scale_factor",
            ),
            // 1/a overflows to an infinite redshift
            (
                SpatialTag::new(10.0, 10.0).with_scale_factor(5e-324),
                "scale_factor",
            ),
        ];
        for (tag, expected) in cases {
            match enc.comoving_position(&tag, &cosmo) {
                Err(EncodeError::InvalidCoordinate { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected InvalidCoordinate for {expected}, got {other:?}"),
            }
        }
        assert_eq!(
            enc.comoving_position(&SpatialTag::new(0.0, 0.0), &cosmo),
            Err(EncodeError::MissingRadialCoordinate)
        );
    }

    #[test]
    fn test_nesting() {
        let enc = encoder();
        let positions = [
            [123.4, -567.8, 901.2],
            [-6_999.9, 6_999.9, 0.0],
            [0.001, -0.001, 3_333.3],
        ];
        for p in positions {
            let fine = enc.encode_position(p, 40).unwrap();
            for n in MIN_PRECISION..40 {
                let coarse = enc.encode_position(p, n).unwrap();
                assert_eq!(fine.truncate(n), Some(coarse), "precision {n} for {p:?}");
            }
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(SpatialEncoder::new(EncoderConfig {
            horizon_length_mpc: -1.0,
            ..Default::default()
        })
        .is_err());
        assert!(SpatialEncoder::new(EncoderConfig::default()).is_ok());
    }
}
