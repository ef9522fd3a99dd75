//! MRC volume files - the source and target format of packing
//!
//! Only the parts of the MRC2014 header needed to restore a volume's
//! geometry are kept; extended headers are skipped on read and never
//! written.

use crate::error::{CodecError, Result};
use crate::types::DataType;
use crate::volume::{with_array, Volume};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::Array3;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Size of the fixed MRC main header
pub const HEADER_SIZE: usize = 1024;

const LABEL_SIZE: usize = 80;
const MAX_LABELS: usize = 10;
const MRC_VERSION: i32 = 20140;

/// Geometry and annotation fields carried over from a source MRC header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeHeader {
    /// Index of the first column, row and section (`nxstart`, `nystart`, `nzstart`)
    pub start: [i32; 3],
    /// Sampling grid size (`mx`, `my`, `mz`)
    pub sampling: [i32; 3],
    /// Cell dimensions in Angstroms
    pub cell_lengths: [f32; 3],
    /// Cell angles in degrees
    pub cell_angles: [f32; 3],
    /// Axis corresponding to columns, rows and sections (1-based)
    pub axis_map: [i32; 3],
    /// Space group number
    pub space_group: i32,
    /// Origin in Angstroms
    pub origin: [f32; 3],
    /// Text labels
    pub labels: Vec<String>,
}

impl VolumeHeader {
    /// Header for a volume of shape `(nz, ny, nx)` with unit voxel size
    pub fn for_shape(shape: [usize; 3]) -> Self {
        let [nz, ny, nx] = shape.map(|d| d as i32);
        Self {
            start: [0; 3],
            sampling: [nx, ny, nz],
            cell_lengths: [nx as f32, ny as f32, nz as f32],
            cell_angles: [90.0; 3],
            axis_map: [1, 2, 3],
            space_group: 1,
            origin: [0.0; 3],
            labels: Vec::new(),
        }
    }

    /// Voxel size in Angstroms along x, y and z
    pub fn voxel_size(&self) -> [f32; 3] {
        let mut size = [1.0; 3];
        for (i, item) in size.iter_mut().enumerate() {
            if self.sampling[i] > 0 {
                *item = self.cell_lengths[i] / self.sampling[i] as f32;
            }
        }
        size
    }
}

/// Parse an MRC file into its header and volume
pub fn decode_mrc(bytes: &[u8]) -> Result<(VolumeHeader, Volume)> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::Format(format!(
            "MRC file is {} bytes, shorter than its {}-byte header",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    // Machine stamp 0x11 marks big-endian data; anything else is read as little-endian
    if bytes[212] == 0x11 {
        decode_with::<BigEndian>(bytes)
    } else {
        decode_with::<LittleEndian>(bytes)
    }
}

fn decode_with<E: ByteOrder>(bytes: &[u8]) -> Result<(VolumeHeader, Volume)> {
    let word = |index: usize| E::read_i32(&bytes[index * 4..index * 4 + 4]);
    let float = |index: usize| E::read_f32(&bytes[index * 4..index * 4 + 4]);

    let dims = [word(0), word(1), word(2)];
    if dims.iter().any(|&d| d < 0) {
        return Err(CodecError::Format(format!(
            "negative MRC dimensions {:?}",
            dims
        )));
    }
    let [nx, ny, nz] = dims.map(|d| d as usize);
    let data_type = DataType::from_mrc_mode(word(3))?;

    let nsymbt = word(23);
    if nsymbt < 0 {
        return Err(CodecError::Format(format!(
            "negative extended header size {}",
            nsymbt
        )));
    }

    let header = VolumeHeader {
        start: [word(4), word(5), word(6)],
        sampling: [word(7), word(8), word(9)],
        cell_lengths: [float(10), float(11), float(12)],
        cell_angles: [float(13), float(14), float(15)],
        axis_map: [word(16), word(17), word(18)],
        space_group: word(22),
        origin: [float(49), float(50), float(51)],
        labels: read_labels(bytes, word(55)),
    };

    let offset = HEADER_SIZE + nsymbt as usize;
    let data_len = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .and_then(|n| n.checked_mul(data_type.size_in_bytes()))
        .ok_or_else(|| CodecError::Format(format!("MRC dimensions {:?} overflow", dims)))?;
    let data = offset
        .checked_add(data_len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            CodecError::Truncated(format!(
                "MRC data needs {} bytes after offset {}, file has {}",
                data_len,
                offset,
                bytes.len()
            ))
        })?;

    let shape = (nz, ny, nx);
    let volume = match data_type {
        DataType::I8 => Volume::I8(to_array(shape, data.iter().map(|&b| b as i8).collect())?),
        DataType::I16 => Volume::I16(to_array(
            shape,
            data.chunks_exact(2).map(E::read_i16).collect(),
        )?),
        DataType::U16 => Volume::U16(to_array(
            shape,
            data.chunks_exact(2).map(E::read_u16).collect(),
        )?),
        DataType::F32 => Volume::F32(to_array(
            shape,
            data.chunks_exact(4).map(E::read_f32).collect(),
        )?),
        other => {
            return Err(CodecError::UnsupportedDataType(format!(
                "{} samples in MRC mode {}",
                other,
                word(3)
            )))
        }
    };

    Ok((header, volume))
}

fn to_array<T>(shape: (usize, usize, usize), samples: Vec<T>) -> Result<Array3<T>> {
    Array3::from_shape_vec(shape, samples).map_err(|e| CodecError::Format(e.to_string()))
}

fn read_labels(bytes: &[u8], count: i32) -> Vec<String> {
    let count = count.clamp(0, MAX_LABELS as i32) as usize;
    (0..count)
        .map(|i| {
            let start = 224 + i * LABEL_SIZE;
            String::from_utf8_lossy(&bytes[start..start + LABEL_SIZE])
                .trim_end_matches(['\0', ' '])
                .to_string()
        })
        .collect()
}

/// Serialize a volume as a little-endian MRC2014 file.
///
/// Geometry comes from `header` when given; density statistics are
/// always recomputed from the samples.
pub fn encode_mrc(volume: &Volume, header: Option<&VolumeHeader>) -> Result<Vec<u8>> {
    let data_type = volume.data_type();
    let mode = data_type.mrc_mode().ok_or_else(|| {
        CodecError::UnsupportedDataType(format!("{} has no MRC mode", data_type))
    })?;

    let shape = volume.shape();
    let defaults;
    let header = match header {
        Some(header) => header,
        None => {
            defaults = VolumeHeader::for_shape(shape);
            &defaults
        }
    };

    let [nz, ny, nx] = shape;
    let mut out = vec![0u8; HEADER_SIZE + volume.size_in_bytes()];
    {
        let head = &mut out[..HEADER_SIZE];
        let mut put_i32 = |index: usize, value: i32| {
            LittleEndian::write_i32(&mut head[index * 4..index * 4 + 4], value)
        };
        put_i32(0, nx as i32);
        put_i32(1, ny as i32);
        put_i32(2, nz as i32);
        put_i32(3, mode);
        for i in 0..3 {
            put_i32(4 + i, header.start[i]);
            put_i32(7 + i, header.sampling[i]);
            put_i32(16 + i, header.axis_map[i]);
        }
        put_i32(22, header.space_group);
        put_i32(23, 0);
        put_i32(27, MRC_VERSION);
        put_i32(55, header.labels.len().min(MAX_LABELS) as i32);

        let stats = DensityStats::of(volume);
        let mut put_f32 = |index: usize, value: f32| {
            LittleEndian::write_f32(&mut head[index * 4..index * 4 + 4], value)
        };
        for i in 0..3 {
            put_f32(10 + i, header.cell_lengths[i]);
            put_f32(13 + i, header.cell_angles[i]);
            put_f32(49 + i, header.origin[i]);
        }
        put_f32(19, stats.min as f32);
        put_f32(20, stats.max as f32);
        put_f32(21, stats.mean as f32);
        put_f32(54, stats.rms as f32);

        head[208..212].copy_from_slice(b"MAP ");
        head[212..216].copy_from_slice(&[0x44, 0x44, 0x00, 0x00]);
        for (i, label) in header.labels.iter().take(MAX_LABELS).enumerate() {
            let start = 224 + i * LABEL_SIZE;
            let text = label.as_bytes();
            let len = text.len().min(LABEL_SIZE);
            head[start..start + len].copy_from_slice(&text[..len]);
        }
    }

    let data = &mut out[HEADER_SIZE..];
    match volume {
        Volume::I8(arr) => {
            for (dst, &v) in data.iter_mut().zip(arr.iter()) {
                *dst = v as u8;
            }
        }
        Volume::I16(arr) => {
            for (dst, &v) in data.chunks_exact_mut(2).zip(arr.iter()) {
                LittleEndian::write_i16(dst, v);
            }
        }
        Volume::U16(arr) => {
            for (dst, &v) in data.chunks_exact_mut(2).zip(arr.iter()) {
                LittleEndian::write_u16(dst, v);
            }
        }
        Volume::F32(arr) => {
            for (dst, &v) in data.chunks_exact_mut(4).zip(arr.iter()) {
                LittleEndian::write_f32(dst, v);
            }
        }
        Volume::U8(_) | Volume::I32(_) | Volume::F64(_) => {
            return Err(CodecError::UnsupportedDataType(format!(
                "{} has no MRC mode",
                data_type
            )))
        }
    }

    Ok(out)
}

/// Density statistics stored in the MRC header
#[derive(Debug, Clone, Copy)]
struct DensityStats {
    min: f64,
    max: f64,
    mean: f64,
    rms: f64,
}

impl DensityStats {
    fn of(volume: &Volume) -> Self {
        let n = volume.len();
        if n == 0 {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                rms: 0.0,
            };
        }
        let (min, max, sum, sum_sq) = with_array!(volume, arr => {
            arr.iter().filter_map(|v| v.to_f64()).fold(
                (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0.0),
                |(lo, hi, s, sq), v| (lo.min(v), hi.max(v), s + v, sq + v * v),
            )
        });
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        Self {
            min,
            max,
            mean,
            rms: variance.sqrt(),
        }
    }
}
