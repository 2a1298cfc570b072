//! Hierarchical Z-order addresses.
//!
//! Bit `i` of axis `k` lands on bit `3i + k` of the code, so the address of a
//! cell at precision `N` is exactly the top `3N` bits of any address inside
//! it at a finer precision.

use serde::{Deserialize, Serialize};
use std::fmt;
use tensorcal_core::constants::{MAX_PRECISION, MIN_PRECISION};
use tensorcal_core::EncodeError;

/// Z-order address of a cubic cell at a given precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpatialAddress {
    precision: u8,
    code: u128,
}

impl SpatialAddress {
    /// Interleave three quantized axis coordinates.
    ///
    /// Only the low `precision` bits of each axis are used. Precisions
    /// outside the supported range are rejected.
    pub fn from_axes(axes: [u64; 3], precision: u8) -> Result<Self, EncodeError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(EncodeError::InvalidPrecision {
                precision,
                min: MIN_PRECISION,
                max: MAX_PRECISION,
            });
        }
        let mut code = 0u128;
        for i in 0..u32::from(precision) {
            for (k, &axis) in axes.iter().enumerate() {
                code |= u128::from((axis >> i) & 1) << (3 * i + k as u32);
            }
        }
        Ok(Self { precision, code })
    }

    /// Wrap a code already known to be valid at `precision`.
    pub(crate) fn from_code(code: u128, precision: u8) -> Self {
        Self { precision, code }
    }

    /// Raw interleaved code.
    #[must_use]
    pub fn code(&self) -> u128 {
        self.code
    }

    /// Bits per axis.
    #[must_use]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of significant bits in the code.
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        3 * u32::from(self.precision)
    }

    /// Recover the quantized axis coordinates.
    #[must_use]
    pub fn axes(&self) -> [u64; 3] {
        let mut axes = [0u64; 3];
        for i in 0..u32::from(self.precision) {
            for (k, axis) in axes.iter_mut().enumerate() {
                *axis |= (((self.code >> (3 * i + k as u32)) & 1) as u64) << i;
            }
        }
        axes
    }

    /// Address of the enclosing cell at a coarser precision.
    ///
    /// Returns `None` if `precision` is finer than this address.
    #[must_use]
    pub fn truncate(&self, precision: u8) -> Option<Self> {
        if precision > self.precision {
            return None;
        }
        let shift = 3 * u32::from(self.precision - precision);
        Some(Self {
            precision,
            code: self.code >> shift,
        })
    }

    /// Whether `other` lies inside this cell.
    #[must_use]
    pub fn contains(&self, other: &SpatialAddress) -> bool {
        other.truncate(self.precision) == Some(*self)
    }
}

impl fmt::Display for SpatialAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (self.bit_width() as usize).div_ceil(4).max(1);
        write!(f, "{}:{:0width$x}", self.precision, self.code, width = digits)
    }
}
