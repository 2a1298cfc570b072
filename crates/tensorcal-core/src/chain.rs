//! Posterior sample chains.
//!
//! A [`Chain`] is the read-only input of a calibration run: an ordered set of
//! [`Sample`]s sharing one parameter schema. Samples may carry a
//! [`SpatialTag`] locating the measurement that produced them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sky position and radial information attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialTag {
    /// Right ascension in degrees, `[0, 360)`
    pub ra_deg: f64,
    /// Declination in degrees, `[-90, 90]`
    pub dec_deg: f64,
    /// Luminosity distance in Mpc
    pub distance_mpc: Option<f64>,
    /// Cosmological scale factor, `(0, 1]`
    pub scale_factor: Option<f64>,
}

impl SpatialTag {
    /// Sky position without radial information.
    #[must_use]
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra_deg,
            dec_deg,
            distance_mpc: None,
            scale_factor: None,
        }
    }

    /// Sky position at a luminosity distance.
    #[must_use]
    pub fn at_distance(ra_deg: f64, dec_deg: f64, distance_mpc: f64) -> Self {
        Self::new(ra_deg, dec_deg).with_distance(distance_mpc)
    }

    /// Set the luminosity distance in Mpc.
    #[must_use]
    pub fn with_distance(mut self, distance_mpc: f64) -> Self {
        self.distance_mpc = Some(distance_mpc);
        self
    }

    /// Set the scale factor.
    #[must_use]
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = Some(scale_factor);
        self
    }

    /// Whether the tag carries enough information to place the sample radially.
    #[must_use]
    pub fn has_radial(&self) -> bool {
        self.distance_mpc.is_some() || self.scale_factor.is_some()
    }
}

/// One posterior draw: a parameter vector plus optional spatial metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    values: Vec<f64>,
    spatial: Option<SpatialTag>,
}

impl Sample {
    /// Create a sample without spatial data.
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            spatial: None,
        }
    }

    /// Attach a spatial tag.
    #[must_use]
    pub fn with_spatial(mut self, tag: SpatialTag) -> Self {
        self.spatial = Some(tag);
        self
    }

    /// Parameter values, aligned with the owning chain's schema.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Spatial tag, if any.
    #[must_use]
    pub fn spatial(&self) -> Option<&SpatialTag> {
        self.spatial.as_ref()
    }
}

/// A named, immutable collection of posterior samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChainData")]
pub struct Chain {
    name: String,
    schema: Vec<String>,
    samples: Vec<Sample>,
}

/// Unvalidated serde form of [`Chain`].
#[derive(Deserialize)]
struct ChainData {
    name: String,
    schema: Vec<String>,
    samples: Vec<Sample>,
}

impl TryFrom<ChainData> for Chain {
    type Error = ValidationError;

    fn try_from(data: ChainData) -> Result<Self, Self::Error> {
        Self::new(data.name, data.schema, data.samples)
    }
}

impl Chain {
    /// Create a chain, checking that every sample matches the schema and that
    /// all parameter values are finite.
    pub fn new(
        name: impl Into<String>,
        schema: Vec<String>,
        samples: Vec<Sample>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();

        if schema.is_empty() {
            return Err(ValidationError::chain(name, "parameter schema is empty"));
        }
        let mut seen = HashSet::with_capacity(schema.len());
        for parameter in &schema {
            if !seen.insert(parameter.as_str()) {
                return Err(ValidationError::chain(
                    name,
                    format!("duplicate parameter '{parameter}'"),
                ));
            }
        }

        for (index, sample) in samples.iter().enumerate() {
            if sample.values.len() != schema.len() {
                return Err(ValidationError::chain(
                    name,
                    format!(
                        "sample {index} has {} values, schema has {}",
                        sample.values.len(),
                        schema.len()
                    ),
                ));
            }
            if let Some(p) = sample.values.iter().position(|v| !v.is_finite()) {
                return Err(ValidationError::NonFiniteValue {
                    chain: name,
                    sample: index,
                    parameter: schema[p].clone(),
                });
            }
        }

        Ok(Self {
            name,
            schema,
            samples,
        })
    }

    /// Start building a chain.
    pub fn builder(name: impl Into<String>) -> ChainBuilder {
        ChainBuilder::new(name)
    }

    /// Chain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names.
    #[must_use]
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// All samples in input order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the chain has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples carrying a spatial tag.
    #[must_use]
    pub fn spatial_count(&self) -> usize {
        self.samples.iter().filter(|s| s.spatial.is_some()).count()
    }

    /// Whether any sample carries spatial data.
    #[must_use]
    pub fn is_spatial(&self) -> bool {
        self.samples.iter().any(|s| s.spatial.is_some())
    }

    /// Index of a parameter in the schema.
    #[must_use]
    pub fn parameter_index(&self, parameter: &str) -> Option<usize> {
        self.schema.iter().position(|p| p == parameter)
    }

    /// Iterate over the values of one parameter.
    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(move |s| s.values[index])
    }
}

/// Builder for [`Chain`].
#[derive(Debug, Default)]
pub struct ChainBuilder {
    name: String,
    schema: Vec<String>,
    samples: Vec<Sample>,
}

impl ChainBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a parameter name to the schema
    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.schema.push(name.into());
        self
    }

    /// Append several parameter names
    pub fn parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema.extend(names.into_iter().map(Into::into));
        self
    }

    /// Append a sample
    pub fn sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Append several samples
    pub fn samples(mut self, samples: impl IntoIterator<Item = Sample>) -> Self {
        self.samples.extend(samples);
        self
    }

    /// Build and validate the chain
    pub fn build(self) -> Result<Chain, ValidationError> {
        Chain::new(self.name, self.schema, self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_param_chain() -> Chain {
        Chain::builder("test")
            .parameters(["H0", "Omega_m"])
            .sample(Sample::new(vec![67.0, 0.31]))
            .sample(
                Sample::new(vec![68.0, 0.32])
                    .with_spatial(SpatialTag::at_distance(10.0, -5.0, 120.0)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder() {
        let chain = two_param_chain();
        assert_eq!(chain.name(), "test");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.spatial_count(), 1);
        assert!(chain.is_spatial());
        assert_eq!(chain.parameter_index("Omega_m"), Some(1));
        assert_eq!(chain.column(0).collect::<Vec<_>>(), vec![67.0, 68.0]);
    }

    #[test]
    fn test_rejects_ragged_samples() {
        let result = Chain::builder("bad")
            .parameters(["a", "b"])
            .sample(Sample::new(vec![1.0]))
            .build();
        assert!(matches!(result, Err(ValidationError::InvalidChain { .. })));
    }

    #[test]
    fn test_rejects_non_finite() {
        let result = Chain::builder("nan")
            .parameter("a")
            .sample(Sample::new(vec![1.0]))
            .sample(Sample::new(vec![f64::NAN]))
            .build();
        assert_eq!(
            result,
            Err(ValidationError::NonFiniteValue {
                chain: "nan".into(),
                sample: 1,
                parameter: "a".into()
            })
        );
    }

    #[test]
    fn test_rejects_bad_schema() {
        assert!(Chain::builder("empty").build().is_err());
        assert!(Chain::builder("dup").parameters(["a", "a"]).build().is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let json = serde_json::to_string(&two_param_chain()).unwrap();
        let back: Chain = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);

        let ragged = r#"{"name":"x","schema":["a","b"],"samples":[{"values":[1.0],"spatial":null}]}"#;
        assert!(serde_json::from_str::<Chain>(ragged).is_err());
    }

    #[test]
    fn test_spatial_tag_radial() {
        assert!(!SpatialTag::new(0.0, 0.0).has_radial());
        assert!(SpatialTag::new(0.0, 0.0).with_scale_factor(0.5).has_radial());
        assert!(SpatialTag::at_distance(0.0, 0.0, 10.0).has_radial());
    }
}
