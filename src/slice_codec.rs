//! Lossy 8-bit image compression of individual slices

use crate::error::{CodecError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image formats a slice may be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SliceFormat {
    /// Baseline grayscale JPEG
    #[default]
    Jpeg = 0,
}

/// JPEG quality (1-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    /// Qualities above this give little size benefit
    pub const DISCOURAGED_ABOVE: u8 = 95;

    pub fn new(value: u32) -> Result<Self> {
        if !(1..=100).contains(&value) {
            return Err(CodecError::InvalidQuality(value));
        }
        Ok(Self(value as u8))
    }

    pub fn best() -> Self {
        Self(100)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Whether this quality is valid but not worth its size
    pub fn is_discouraged(&self) -> bool {
        self.0 > Self::DISCOURAGED_ABOVE
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

impl TryFrom<u8> for Quality {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(u32::from(value))
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> u8 {
        quality.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for slice encode/decode operations
pub trait SliceCodec: Send + Sync {
    /// Compress one 2D byte slice into a self-describing image blob
    fn encode(&self, slice: ArrayView2<'_, u8>, quality: Quality) -> Result<Vec<u8>>;

    /// Decompress an image blob back into a `(height, width)` byte array
    fn decode(&self, data: &[u8]) -> Result<Array2<u8>>;

    /// Get the image format
    fn format(&self) -> SliceFormat;
}

/// Grayscale JPEG slices
#[derive(Debug, Default)]
pub struct JpegCodec;

impl SliceCodec for JpegCodec {
    fn encode(&self, slice: ArrayView2<'_, u8>, quality: Quality) -> Result<Vec<u8>> {
        let (height, width) = slice.dim();
        let width = u32::try_from(width).map_err(|e| CodecError::Encode(e.to_string()))?;
        let height = u32::try_from(height).map_err(|e| CodecError::Encode(e.to_string()))?;

        // Views along axes 1 and 2 are not contiguous; iteration is row-major either way.
        let pixels = match slice.as_slice() {
            Some(pixels) => std::borrow::Cow::Borrowed(pixels),
            None => std::borrow::Cow::Owned(slice.iter().copied().collect::<Vec<u8>>()),
        };

        let mut compressed = Vec::new();
        JpegEncoder::new_with_quality(&mut compressed, quality.value())
            .encode(&pixels, width, height, ExtendedColorType::L8)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(compressed)
    }

    fn decode(&self, data: &[u8]) -> Result<Array2<u8>> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| CodecError::CorruptSlice {
                index: 0,
                reason: e.to_string(),
            })?
            .into_luma8();
        let (width, height) = image.dimensions();
        Array2::from_shape_vec((height as usize, width as usize), image.into_raw()).map_err(|e| {
            CodecError::CorruptSlice {
                index: 0,
                reason: e.to_string(),
            }
        })
    }

    fn format(&self) -> SliceFormat {
        SliceFormat::Jpeg
    }
}

/// Get a codec for a given slice format
pub fn get_codec(format: SliceFormat) -> Box<dyn SliceCodec> {
    match format {
        SliceFormat::Jpeg => Box::new(JpegCodec),
    }
}

/// Encode one slice as JPEG
pub fn encode_slice(slice: ArrayView2<'_, u8>, quality: Quality) -> Result<Vec<u8>> {
    JpegCodec.encode(slice, quality)
}

/// Decode one JPEG slice
pub fn decode_slice(data: &[u8]) -> Result<Array2<u8>> {
    JpegCodec.decode(data)
}
