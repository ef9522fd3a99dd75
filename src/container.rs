//! The `.jpgs` container: metadata plus an ordered sequence of slice images
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic       4 bytes   "JPGS"
//! version     u16 major, u16 minor
//! header_len  u32
//! header      bincode-encoded ContainerMetadata
//! count       u32       number of slice blobs
//! count x     u32 length, then that many bytes of image data
//! ```

use crate::error::{CodecError, Result};
use crate::io::{FileSystemIOManager, IOManager};
use crate::mrc::VolumeHeader;
use crate::slice_codec::{Quality, SliceFormat};
use crate::types::{DataType, SliceAxis, ValueRange};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Magic number at the start of every container
pub const CONTAINER_MAGIC: &[u8; 4] = b"JPGS";

/// File extension of containers
pub const CONTAINER_EXTENSION: &str = "jpgs";

/// Container format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Everything needed to allocate and reconstruct the packed volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// Volume shape `[D0, D1, D2]`
    pub shape: [usize; 3],

    /// Element type of the original volume
    pub data_type: DataType,

    /// Normalization parameters
    pub value_range: ValueRange,

    /// Axis the volume was sliced along
    pub slice_axis: SliceAxis,

    /// Quality the slices were encoded with
    pub quality: Quality,

    /// Image format of every slice
    pub slice_format: SliceFormat,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Geometry of the source MRC file, restored on unpack
    pub source_header: Option<VolumeHeader>,

    /// Free-form key-value pairs
    pub attributes: BTreeMap<String, String>,
}

impl ContainerMetadata {
    /// Create new metadata
    pub fn new(shape: [usize; 3], data_type: DataType, value_range: ValueRange) -> Self {
        Self {
            shape,
            data_type,
            value_range,
            slice_axis: SliceAxis::default(),
            quality: Quality::default(),
            slice_format: SliceFormat::default(),
            created_at: Utc::now(),
            source_header: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_slice_axis(mut self, axis: SliceAxis) -> Self {
        self.slice_axis = axis;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_source_header(mut self, header: Option<VolumeHeader>) -> Self {
        self.source_header = header;
        self
    }

    /// Add an attribute
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Get an attribute
    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    /// Number of slices along the slicing axis
    pub fn slice_count(&self) -> usize {
        self.slice_axis.split_shape(self.shape).0
    }

    /// `(height, width)` of every slice
    pub fn slice_dims(&self) -> (usize, usize) {
        self.slice_axis.split_shape(self.shape).1
    }

    /// Uncompressed size of the described volume in bytes
    pub fn volume_size_bytes(&self) -> usize {
        self.shape.iter().product::<usize>() * self.data_type.size_in_bytes()
    }
}

/// Metadata plus compressed slices, in slice order
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub metadata: ContainerMetadata,
    pub slices: Vec<Bytes>,
}

impl Container {
    pub fn new(metadata: ContainerMetadata, slices: Vec<Bytes>) -> Self {
        Self { metadata, slices }
    }

    /// Total size of the compressed slices
    pub fn compressed_size(&self) -> usize {
        self.slices.iter().map(Bytes::len).sum()
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_container(&self.metadata, &self.slices)
    }

    /// Parse the on-disk layout
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let mut reader = ByteReader::new(data);

        let magic = reader
            .take(CONTAINER_MAGIC.len())
            .ok_or_else(|| CodecError::Format("file too short for magic number".to_string()))?;
        if magic.as_ref() != CONTAINER_MAGIC {
            return Err(CodecError::Format(format!(
                "bad magic number {:02x?}",
                magic.as_ref()
            )));
        }

        let (major, minor) = match (reader.u16(), reader.u16()) {
            (Some(major), Some(minor)) => (major, minor),
            _ => return Err(CodecError::Format("missing format version".to_string())),
        };
        if !FormatVersion::new(major, minor).is_compatible(&FormatVersion::CURRENT) {
            return Err(CodecError::UnsupportedVersion(major, minor));
        }

        let header_len = reader
            .u32()
            .ok_or_else(|| CodecError::Format("missing header length".to_string()))?;
        let header = reader.take(header_len as usize).ok_or_else(|| {
            CodecError::Format(format!("header of {} bytes is cut short", header_len))
        })?;
        let metadata: ContainerMetadata = bincode::deserialize(&header)
            .map_err(|e| CodecError::Format(format!("malformed header: {}", e)))?;

        let count = reader
            .u32()
            .ok_or_else(|| CodecError::Truncated("file ends before slice count".to_string()))?
            as usize;

        let mut slices = Vec::with_capacity(count.min(reader.remaining() / 4));
        for index in 0..count {
            let blob = reader
                .u32()
                .and_then(|len| reader.take(len as usize))
                .ok_or_else(|| {
                    CodecError::Truncated(format!(
                        "file ends in slice {} of {} declared",
                        index, count
                    ))
                })?;
            slices.push(blob);
        }

        if reader.remaining() != 0 {
            return Err(CodecError::Format(format!(
                "{} trailing bytes after the last slice",
                reader.remaining()
            )));
        }

        Ok(Self { metadata, slices })
    }
}

/// Serialize metadata and slices to the on-disk layout
pub fn encode_container(metadata: &ContainerMetadata, slices: &[Bytes]) -> Result<Vec<u8>> {
    let header = bincode::serialize(metadata)?;
    let body: usize = slices.iter().map(|s| s.len() + 4).sum();
    let mut out = Vec::with_capacity(16 + header.len() + body);

    out.extend_from_slice(CONTAINER_MAGIC);
    out.extend_from_slice(&FormatVersion::CURRENT.major.to_le_bytes());
    out.extend_from_slice(&FormatVersion::CURRENT.minor.to_le_bytes());
    out.extend_from_slice(&length_prefix(header.len(), "header")?);
    out.extend_from_slice(&header);
    out.extend_from_slice(&length_prefix(slices.len(), "slice count")?);
    for slice in slices {
        out.extend_from_slice(&length_prefix(slice.len(), "slice")?);
        out.extend_from_slice(slice);
    }

    Ok(out)
}

fn length_prefix(len: usize, what: &str) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| CodecError::Format(format!("{} length {} exceeds u32", what, len)))
}

/// Atomically write a container to `path`, returning the bytes written
pub async fn write_container(
    path: &Path,
    metadata: &ContainerMetadata,
    slices: &[Bytes],
) -> Result<u64> {
    write_container_with(&FileSystemIOManager::new(), path, metadata, slices).await
}

/// [`write_container`] through a specific storage backend
pub async fn write_container_with(
    io: &dyn IOManager,
    path: &Path,
    metadata: &ContainerMetadata,
    slices: &[Bytes],
) -> Result<u64> {
    let data = encode_container(metadata, slices)?;
    io.write(path, &data).await?;
    Ok(data.len() as u64)
}

/// Read a container from `path`
pub async fn read_container(path: &Path) -> Result<Container> {
    read_container_with(&FileSystemIOManager::new(), path).await
}

/// [`read_container`] through a specific storage backend
pub async fn read_container_with(io: &dyn IOManager, path: &Path) -> Result<Container> {
    Container::from_bytes(io.read(path).await?)
}

/// Cursor over shared bytes; slices are zero-copy views
struct ByteReader {
    data: Bytes,
    pos: usize,
}

impl ByteReader {
    fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Option<Bytes> {
        if len > self.remaining() {
            return None;
        }
        let out = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Some(out)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.take(2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_metadata() -> ContainerMetadata {
        let mut metadata = ContainerMetadata::new([3, 16, 8], DataType::F32, ValueRange::new(-2.5, 7.0))
            .with_slice_axis(SliceAxis::Axis0)
            .with_quality(Quality::new(60).unwrap())
            .with_source_header(Some(VolumeHeader::for_shape([3, 16, 8])));
        metadata.add_attribute("source", "tomo_01.mrc");
        metadata
    }

    fn sample_slices() -> Vec<Bytes> {
        vec![
            Bytes::from_static(b"\xff\xd8first"),
            Bytes::new(),
            Bytes::from(vec![7u8; 300]),
        ]
    }

    #[test]
    fn test_version_compatibility() {
        assert!(FormatVersion::new(1, 0).is_compatible(&FormatVersion::new(1, 4)));
        assert!(!FormatVersion::new(2, 0).is_compatible(&FormatVersion::CURRENT));
    }

    #[test]
    fn test_metadata_helpers() {
        let metadata = sample_metadata();
        assert_eq!(metadata.slice_count(), 3);
        assert_eq!(metadata.slice_dims(), (16, 8));
        assert_eq!(metadata.volume_size_bytes(), 3 * 16 * 8 * 4);
        assert_eq!(metadata.get_attribute("source"), Some("tomo_01.mrc"));
        assert_eq!(metadata.get_attribute("missing"), None);
    }

    #[test]
    fn test_bytes_round_trip() {
        let container = Container::new(sample_metadata(), sample_slices());
        let bytes = container.to_bytes().unwrap();
        assert_eq!(&bytes[..4], CONTAINER_MAGIC);
        let back = Container::from_bytes(Bytes::from(bytes)).unwrap();
        assert_eq!(back, container);
        assert_eq!(back.compressed_size(), 7 + 300);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("volume.jpgs");
        let metadata = sample_metadata();
        let slices = sample_slices();

        let written = write_container(&path, &metadata, &slices).await.unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let container = read_container(&path).await.unwrap();
        assert_eq!(container.metadata, metadata);
        assert_eq!(container.slices, slices);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Container::new(sample_metadata(), sample_slices())
            .to_bytes()
            .unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Container::from_bytes(Bytes::from(bytes)),
            Err(CodecError::Format(_))
        ));
        assert!(matches!(
            Container::from_bytes(Bytes::from_static(b"JP")),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = Container::new(sample_metadata(), sample_slices())
            .to_bytes()
            .unwrap();
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
        assert!(matches!(
            Container::from_bytes(Bytes::from(bytes)),
            Err(CodecError::UnsupportedVersion(9, 0))
        ));
    }

    #[test]
    fn test_malformed_header() {
        let mut bytes = Container::new(sample_metadata(), sample_slices())
            .to_bytes()
            .unwrap();
        // Shrink the declared header so bincode runs out of input
        bytes[8..12].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            Container::from_bytes(Bytes::from(bytes)),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_truncated_slices() {
        let bytes = Container::new(sample_metadata(), sample_slices())
            .to_bytes()
            .unwrap();
        let cut = bytes.len() - 100;
        let result = Container::from_bytes(Bytes::copy_from_slice(&bytes[..cut]));
        assert!(matches!(result, Err(CodecError::Truncated(_))));

        // Drop the last blob entirely, leaving the count at 3
        let cut = bytes.len() - 304;
        let result = Container::from_bytes(Bytes::copy_from_slice(&bytes[..cut]));
        assert!(matches!(result, Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = Container::new(sample_metadata(), sample_slices())
            .to_bytes()
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            Container::from_bytes(Bytes::from(bytes)),
            Err(CodecError::Format(_))
        ));
    }
}
