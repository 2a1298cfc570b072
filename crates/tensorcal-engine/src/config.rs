//! Calibration run configuration.

use serde::{Deserialize, Serialize};
use tensorcal_core::constants::{DEFAULT_CONVERGENCE_THRESHOLD, MIN_CHAIN_SAMPLES};
use tensorcal_core::ValidationError;

use crate::distance::DistanceConfig;
use crate::encoder::EncoderConfig;
use crate::extractor::ExtractorConfig;

/// Configuration for a [`ConvergenceController`](crate::ConvergenceController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Convergence threshold τ on ΔT, in `(0, 1)`
    pub threshold: f64,

    /// Minimum samples per chain
    pub min_chain_samples: usize,

    /// Stop at the first precision with ΔT below τ
    pub early_exit: bool,

    /// Spatial encoder settings
    pub encoder: EncoderConfig,

    /// Tensor extractor settings
    pub extractor: ExtractorConfig,

    /// Epistemic distance settings
    pub distance: DistanceConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            min_chain_samples: MIN_CHAIN_SAMPLES,
            early_exit: true,
            encoder: EncoderConfig::default(),
            extractor: ExtractorConfig::default(),
            distance: DistanceConfig::default(),
        }
    }
}

impl CalibrationConfig {
    /// Create a new configuration builder
    pub fn builder() -> CalibrationConfigBuilder {
        CalibrationConfigBuilder::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold >= 1.0 {
            return Err(ValidationError::InvalidThreshold {
                value: self.threshold,
            });
        }
        if self.min_chain_samples == 0 {
            return Err(ValidationError::config(
                "min_chain_samples must be positive",
            ));
        }
        self.encoder.validate()?;
        self.extractor.validate()?;
        self.distance.validate()?;
        Ok(())
    }
}

/// Builder for CalibrationConfig
#[derive(Debug, Default)]
pub struct CalibrationConfigBuilder {
    config: CalibrationConfig,
}

impl CalibrationConfigBuilder {
    /// Set convergence threshold
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set minimum chain length
    pub fn min_chain_samples(mut self, samples: usize) -> Self {
        self.config.min_chain_samples = samples.max(1);
        self
    }

    /// Enable/disable early exit on convergence
    pub fn early_exit(mut self, enabled: bool) -> Self {
        self.config.early_exit = enabled;
        self
    }

    /// Set horizon length in Mpc
    pub fn horizon_length_mpc(mut self, horizon: f64) -> Self {
        self.config.encoder.horizon_length_mpc = horizon;
        self
    }

    /// Set minimum encoded fraction
    pub fn min_encoded_fraction(mut self, fraction: f64) -> Self {
        self.config.extractor.min_encoded_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set encoding shard size
    pub fn shard_size(mut self, size: usize) -> Self {
        self.config.extractor.shard_size = size.max(1);
        self
    }

    /// Set spatial term weight
    pub fn spatial_weight(mut self, weight: f64) -> Self {
        self.config.distance.spatial_weight = weight.max(0.0);
        self
    }

    /// Replace the extractor settings
    pub fn extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.config.extractor = extractor;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CalibrationConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CalibrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.15);
        assert!(config.early_exit);
    }

    #[test]
    fn test_builder() {
        let config = CalibrationConfig::builder()
            .threshold(0.2)
            .early_exit(false)
            .shard_size(0)
            .min_encoded_fraction(1.5)
            .build();
        assert_eq!(config.threshold, 0.2);
        assert!(!config.early_exit);
        assert_eq!(config.extractor.shard_size, 1);
        assert_eq!(config.extractor.min_encoded_fraction, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold() {
        for threshold in [0.0, 1.0, -0.1, f64::NAN] {
            let config = CalibrationConfig::builder().threshold(threshold).build();
            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn test_serde() {
        let config = CalibrationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CalibrationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
