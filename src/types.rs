//! Core data types shared by the packer and unpacker

use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element types a volume may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// 16-bit floating point
    F16 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
    /// Complex number made of two signed 16-bit integers
    ComplexI16 = 11,
    /// Complex number made of two 32-bit floats
    ComplexF32 = 12,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 | DataType::F16 => 2,
            DataType::I32 | DataType::F32 | DataType::ComplexI16 => 4,
            DataType::F64 | DataType::ComplexF32 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F16 | DataType::F32 | DataType::F64)
    }

    /// Check if samples of this type map onto a real number line
    pub fn is_real(&self) -> bool {
        !matches!(self, DataType::ComplexI16 | DataType::ComplexF32)
    }

    /// Map an MRC `mode` word to a data type
    pub fn from_mrc_mode(mode: i32) -> Result<Self> {
        match mode {
            0 => Ok(DataType::I8),
            1 => Ok(DataType::I16),
            2 => Ok(DataType::F32),
            3 => Ok(DataType::ComplexI16),
            4 => Ok(DataType::ComplexF32),
            6 => Ok(DataType::U16),
            12 => Ok(DataType::F16),
            other => Err(CodecError::UnsupportedDataType(format!(
                "MRC mode {}",
                other
            ))),
        }
    }

    /// The MRC `mode` word for this type, if MRC can store it
    pub fn mrc_mode(&self) -> Option<i32> {
        match self {
            DataType::I8 => Some(0),
            DataType::I16 => Some(1),
            DataType::F32 => Some(2),
            DataType::ComplexI16 => Some(3),
            DataType::ComplexF32 => Some(4),
            DataType::U16 => Some(6),
            DataType::F16 => Some(12),
            DataType::U8 | DataType::I32 | DataType::F64 => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Axis along which a volume is cut into slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SliceAxis {
    /// First axis (sections of an MRC file)
    #[default]
    Axis0 = 0,
    /// Second axis
    Axis1 = 1,
    /// Third axis
    Axis2 = 2,
}

impl SliceAxis {
    /// Convert from usize index
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(SliceAxis::Axis0),
            1 => Ok(SliceAxis::Axis1),
            2 => Ok(SliceAxis::Axis2),
            _ => Err(CodecError::InvalidAxis(index)),
        }
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }

    /// Number of slices and (height, width) of each slice for a given shape
    pub fn split_shape(&self, shape: [usize; 3]) -> (usize, (usize, usize)) {
        match self {
            SliceAxis::Axis0 => (shape[0], (shape[1], shape[2])),
            SliceAxis::Axis1 => (shape[1], (shape[0], shape[2])),
            SliceAxis::Axis2 => (shape[2], (shape[0], shape[1])),
        }
    }
}

/// Global intensity range of a volume, used as normalization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Finite, ordered bounds whose width is also finite
    pub fn is_valid(&self) -> bool {
        self.min <= self.max && (self.max - self.min).is_finite()
    }

    /// Whether the range collapses to a single value
    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }

    /// Width of one quantization level
    pub fn step(&self) -> f64 {
        (self.max - self.min) / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::U8.size_in_bytes(), 1);
        assert_eq!(DataType::I16.size_in_bytes(), 2);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::ComplexF32.size_in_bytes(), 8);
    }

    #[test]
    fn test_mrc_modes() {
        for mode in [0, 1, 2, 3, 4, 6, 12] {
            let dtype = DataType::from_mrc_mode(mode).unwrap();
            assert_eq!(dtype.mrc_mode(), Some(mode));
        }
        assert!(DataType::from_mrc_mode(101).is_err());
        assert_eq!(DataType::F64.mrc_mode(), None);
        assert!(!DataType::ComplexI16.is_real());
        assert!(DataType::F16.is_float());
    }

    #[test]
    fn test_slice_axis() {
        assert_eq!(SliceAxis::from_index(2).unwrap(), SliceAxis::Axis2);
        assert!(matches!(
            SliceAxis::from_index(3),
            Err(CodecError::InvalidAxis(3))
        ));
        assert_eq!(SliceAxis::default().to_index(), 0);

        let shape = [5, 6, 7];
        assert_eq!(SliceAxis::Axis0.split_shape(shape), (5, (6, 7)));
        assert_eq!(SliceAxis::Axis1.split_shape(shape), (6, (5, 7)));
        assert_eq!(SliceAxis::Axis2.split_shape(shape), (7, (5, 6)));
    }

    #[test]
    fn test_value_range() {
        let range = ValueRange::new(0.0, 255.0);
        assert!(range.is_valid());
        assert_eq!(range.step(), 1.0);
        assert!(!range.is_degenerate());
        assert!(ValueRange::new(2.0, 2.0).is_degenerate());
        assert!(!ValueRange::new(1.0, 0.0).is_valid());
        assert!(!ValueRange::new(0.0, f64::INFINITY).is_valid());
        assert!(!ValueRange::new(f64::NAN, 1.0).is_valid());
    }

    #[test]
    fn test_value_range_width_overflow() {
        assert!(!ValueRange::new(-1e308, 1e308).is_valid());
        assert!(ValueRange::new(-1e307, 1e307).is_valid());
    }
}
