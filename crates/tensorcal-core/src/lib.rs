//! Core data model for multi-resolution spatial-tensor calibration.
//!
//! This crate holds the types every other part of the calibration engine is
//! built on. It performs no computation beyond validation and cosmological
//! distance helpers.
//!
//! # Features
//!
//! - **Chains**: named posterior sample collections with a shared parameter
//!   schema and optional sky position / distance / scale factor per sample
//! - **Cosmology**: validated, immutable `H0`/`Ω_m`/`Ω_Λ` records with
//!   Planck 2018 and SH0ES presets and comoving distance integration
//! - **Constants**: horizon length, precision range and default thresholds
//! - **Errors**: typed leaf errors shared by the encoder, extractor and
//!   distance calculator
//!
//! # Example
//!
//! ```rust
//! use tensorcal_core::{Chain, Cosmology, Sample};
//!
//! let cosmology = Cosmology::planck2018();
//! let chain = Chain::builder("cmb")
//!     .parameter("H0")
//!     .samples((0..100).map(|i| Sample::new(vec![67.0 + f64::from(i) * 0.01])))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(chain.len(), 100);
//! assert!(!chain.is_spatial());
//! assert!(cosmology.hubble_distance() > 4000.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod constants;
pub mod cosmology;
pub mod error;

pub use chain::{Chain, ChainBuilder, Sample, SpatialTag};
pub use cosmology::{redshift_to_scale_factor, scale_factor_to_redshift, Cosmology};
pub use error::{DistanceError, EncodeError, ExtractionError, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{Chain, ChainBuilder, Sample, SpatialTag};
    pub use crate::constants::*;
    pub use crate::cosmology::Cosmology;
    pub use crate::error::{DistanceError, EncodeError, ExtractionError, ValidationError};
}
