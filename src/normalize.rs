//! Affine mapping between native sample intensities and the 8-bit range

use crate::error::{CodecError, Result};
use crate::types::ValueRange;
use crate::volume::{with_array, Volume};
use num_traits::ToPrimitive;

/// Byte every sample maps to when the volume has a single value
pub const DEGENERATE_LEVEL: u8 = 128;

/// Scan every sample once and return the global minimum and maximum.
///
/// NaN samples are skipped. A volume without any comparable sample
/// gets the degenerate range `(0, 0)`.
pub fn compute_range(volume: &Volume) -> Result<ValueRange> {
    if volume.is_empty() {
        return Err(CodecError::EmptyVolume);
    }

    let (min, max) = with_array!(volume, arr => {
        arr.iter()
            .filter_map(|v| v.to_f64())
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
    });

    if min > max {
        return Ok(ValueRange::new(0.0, 0.0));
    }
    Ok(ValueRange::new(min, max))
}

/// Map `sample` so that `min -> 0` and `max -> 255`, rounding and clamping.
#[inline]
pub fn quantize(sample: f64, min: f64, max: f64) -> u8 {
    if max == min {
        return DEGENERATE_LEVEL;
    }
    let scaled = (sample - min) / (max - min) * 255.0;
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Inverse of [`quantize`], without rounding or clamping
#[inline]
pub fn dequantize(byte: u8, min: f64, max: f64) -> f64 {
    min + f64::from(byte) * (max - min) / 255.0
}

impl ValueRange {
    #[inline]
    pub fn quantize(&self, sample: f64) -> u8 {
        quantize(sample, self.min, self.max)
    }

    #[inline]
    pub fn dequantize(&self, byte: u8) -> f64 {
        dequantize(byte, self.min, self.max)
    }
}
