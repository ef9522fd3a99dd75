//! In-memory volumes - dense 3D arrays of typed samples

use crate::types::DataType;
use ndarray::Array3;
use num_traits::{Bounded, NumCast, ToPrimitive};

/// Scalar sample types that can live in a [`Volume`]
pub trait Sample: Copy + Send + Sync + ToPrimitive + NumCast + Bounded + 'static {
    /// Identifier recorded in container metadata
    const DATA_TYPE: DataType;

    /// Convert a reconstructed value back into this type.
    ///
    /// Integer types round to nearest and saturate at their bounds.
    fn from_f64_saturating(value: f64) -> Self {
        let value = if Self::DATA_TYPE.is_float() {
            value
        } else {
            let lo = Self::min_value().to_f64().unwrap_or(f64::MIN);
            let hi = Self::max_value().to_f64().unwrap_or(f64::MAX);
            value.round().clamp(lo, hi)
        };
        <Self as NumCast>::from(value).unwrap_or_else(Self::min_value)
    }
}

macro_rules! impl_sample {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const DATA_TYPE: DataType = DataType::$dtype;
            }

            impl From<Array3<$ty>> for Volume {
                fn from(data: Array3<$ty>) -> Self {
                    Volume::$dtype(data)
                }
            }
        )*
    };
}

/// A dense 3D volume with a fixed element type.
///
/// Shape is `(D0, D1, D2)`; for MRC data this is `(nz, ny, nx)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    U8(Array3<u8>),
    U16(Array3<u16>),
    I8(Array3<i8>),
    I16(Array3<i16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

impl_sample!(
    u8 => U8,
    u16 => U16,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

/// Run `$body` with `$arr` bound to the typed array inside a volume
macro_rules! with_array {
    ($volume:expr, $arr:ident => $body:expr) => {
        match $volume {
            $crate::volume::Volume::U8($arr) => $body,
            $crate::volume::Volume::U16($arr) => $body,
            $crate::volume::Volume::I8($arr) => $body,
            $crate::volume::Volume::I16($arr) => $body,
            $crate::volume::Volume::I32($arr) => $body,
            $crate::volume::Volume::F32($arr) => $body,
            $crate::volume::Volume::F64($arr) => $body,
        }
    };
}
pub(crate) use with_array;

impl Volume {
    /// Shape of the volume as `[D0, D1, D2]`
    pub fn shape(&self) -> [usize; 3] {
        with_array!(self, arr => {
            let (d0, d1, d2) = arr.dim();
            [d0, d1, d2]
        })
    }

    /// Element type of the volume
    pub fn data_type(&self) -> DataType {
        match self {
            Volume::U8(_) => DataType::U8,
            Volume::U16(_) => DataType::U16,
            Volume::I8(_) => DataType::I8,
            Volume::I16(_) => DataType::I16,
            Volume::I32(_) => DataType::I32,
            Volume::F32(_) => DataType::F32,
            Volume::F64(_) => DataType::F64,
        }
    }

    /// Total number of samples
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uncompressed size of the sample data in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.data_type().size_in_bytes()
    }

    /// Copy of the samples widened to `f64`
    pub fn to_f64(&self) -> Array3<f64> {
        with_array!(self, arr => arr.mapv(|v| v.to_f64().unwrap_or(f64::NAN)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_shape_and_type() {
        let volume = Volume::from(Array3::<f32>::zeros((4, 5, 6)));
        assert_eq!(volume.shape(), [4, 5, 6]);
        assert_eq!(volume.data_type(), DataType::F32);
        assert_eq!(volume.len(), 120);
        assert_eq!(volume.size_in_bytes(), 480);
        assert!(!volume.is_empty());

        let empty = Volume::from(Array3::<i16>::zeros((0, 5, 6)));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_saturating_conversion() {
        assert_eq!(i8::from_f64_saturating(-200.0), -128);
        assert_eq!(i8::from_f64_saturating(126.6), 127);
        assert_eq!(u16::from_f64_saturating(-3.0), 0);
        assert_eq!(u8::from_f64_saturating(f64::NAN), 0);
        assert_eq!(f32::from_f64_saturating(1.25), 1.25f32);
    }

    #[test]
    fn test_to_f64() {
        let volume = Volume::from(Array3::from_elem((1, 2, 2), -7i16));
        assert!(volume.to_f64().iter().all(|&v| v == -7.0));
    }
}
