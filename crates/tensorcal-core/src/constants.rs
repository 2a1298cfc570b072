//! Physical constants and engine defaults.

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Side length of the encoded cube in comoving Mpc.
///
/// Positions are normalized to `x / HORIZON_LENGTH_MPC + 0.5`, so the cube
/// spans `±7000` Mpc around the observer.
pub const HORIZON_LENGTH_MPC: f64 = 14_000.0;

/// Lowest supported quantization precision (bits per axis).
pub const MIN_PRECISION: u8 = 4;

/// Highest supported quantization precision (bits per axis).
///
/// Three interleaved 40-bit axes fit in a `u128` address.
pub const MAX_PRECISION: u8 = 40;

/// Oversampling factor relating a physical scale to its native precision.
pub const SCALE_OVERSAMPLING: f64 = 20.0;

/// Default convergence threshold τ on the epistemic distance.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.15;

/// Final ΔT above which an unresolved disagreement is flagged as likely
/// fundamental rather than systematic.
pub const NEW_PHYSICS_THRESHOLD: f64 = 0.30;

/// Minimum number of samples a chain must contain.
pub const MIN_CHAIN_SAMPLES: usize = 100;

/// Minimum fraction of spatially tagged samples that must encode successfully.
pub const MIN_ENCODED_FRACTION: f64 = 0.5;

/// Exclusion rate above which a warning is logged.
pub const EXCLUSION_WARNING_RATE: f64 = 0.05;

/// Relative tolerance on `Ω_m + Ω_Λ = 1`.
pub const FLATNESS_TOLERANCE: f64 = 0.01;
