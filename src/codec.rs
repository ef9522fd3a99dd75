//! Pack and unpack orchestration
//!
//! `pack` and `unpack` are pure functions over in-memory values. Per-slice
//! work runs on a rayon pool sized by [`CodecConfig::cores`]; every worker
//! returns `(index, result)` and results are put back in slice order before
//! anything is assembled. `pack_file` and `unpack_file` wrap them with MRC
//! and container file I/O.

use crate::config::CodecConfig;
use crate::container::{read_container_with, write_container_with, Container, ContainerMetadata};
use crate::error::{CodecError, Result};
use crate::io::{FileSystemIOManager, IOManager};
use crate::mrc::{decode_mrc, encode_mrc, VolumeHeader};
use crate::normalize::compute_range;
use crate::slice_codec::{encode_slice, get_codec, Quality, SliceCodec};
use crate::types::{DataType, SliceAxis, ValueRange};
use crate::utils::{format_bytes, size_reduction_percent};
use crate::volume::{Sample, Volume};
use bytes::Bytes;
use ndarray::{Array2, Array3, Axis};
use num_traits::ToPrimitive;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Build the worker pool for one job
fn worker_pool(cores: usize) -> Result<ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(cores.max(1))
        .thread_name(|i| format!("jpgstack-worker-{}", i))
        .build()?)
}

/// Put `(index, result)` pairs back in index order, failing on the first error
fn in_slice_order<T>(mut results: Vec<(usize, Result<T>)>) -> Result<Vec<T>> {
    results.sort_unstable_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Pack a volume into a container
pub fn pack(volume: &Volume, config: &CodecConfig) -> Result<Container> {
    pack_with_header(volume, None, config)
}

/// Pack a volume, keeping its source MRC geometry in the metadata
pub fn pack_with_header(
    volume: &Volume,
    header: Option<VolumeHeader>,
    config: &CodecConfig,
) -> Result<Container> {
    let data_type = volume.data_type();
    if !data_type.is_real() {
        return Err(CodecError::UnsupportedDataType(data_type.to_string()));
    }

    let range = compute_range(volume)?;
    if !range.is_valid() {
        return Err(CodecError::UnsupportedDataType(format!(
            "{} samples span a non-finite range [{}, {}]",
            data_type, range.min, range.max
        )));
    }

    if config.quality.is_discouraged() {
        warn!(
            "quality {} is above {} and gives little size benefit",
            config.quality,
            Quality::DISCOURAGED_ABOVE
        );
    }

    let pool = worker_pool(config.cores)?;
    let slices = crate::volume::with_array!(volume, arr => {
        pack_slices(arr, range, config.slice_axis, config.quality, &pool)?
    });

    debug!(
        "packed {} slices of {:?} {} along axis {}",
        slices.len(),
        volume.shape(),
        data_type,
        config.slice_axis.to_index()
    );

    let metadata = ContainerMetadata::new(volume.shape(), data_type, range)
        .with_slice_axis(config.slice_axis)
        .with_quality(config.quality)
        .with_source_header(header);
    Ok(Container::new(metadata, slices))
}

fn pack_slices<T: Sample>(
    data: &Array3<T>,
    range: ValueRange,
    axis: SliceAxis,
    quality: Quality,
    pool: &ThreadPool,
) -> Result<Vec<Bytes>> {
    let axis = Axis(axis.to_index());
    let count = data.len_of(axis);

    let results: Vec<(usize, Result<Bytes>)> = pool.install(|| {
        (0..count)
            .into_par_iter()
            .map(|index| {
                let quantized = data
                    .index_axis(axis, index)
                    .mapv(|v| range.quantize(v.to_f64().unwrap_or(f64::NAN)));
                (index, encode_slice(quantized.view(), quality).map(Bytes::from))
            })
            .collect()
    });

    in_slice_order(results)
}

/// Reconstruct the volume held by a container
pub fn unpack(container: &Container, config: &CodecConfig) -> Result<Volume> {
    let metadata = &container.metadata;

    let declared = metadata.slice_count();
    if container.slices.len() != declared {
        return Err(CodecError::SliceCountMismatch {
            declared,
            actual: container.slices.len(),
        });
    }
    if !metadata.value_range.is_valid() {
        return Err(CodecError::Format(format!(
            "invalid value range [{}, {}]",
            metadata.value_range.min, metadata.value_range.max
        )));
    }

    let pool = worker_pool(config.cores)?;
    let volume = match metadata.data_type {
        DataType::U8 => Volume::U8(unpack_slices(container, &pool)?),
        DataType::U16 => Volume::U16(unpack_slices(container, &pool)?),
        DataType::I8 => Volume::I8(unpack_slices(container, &pool)?),
        DataType::I16 => Volume::I16(unpack_slices(container, &pool)?),
        DataType::I32 => Volume::I32(unpack_slices(container, &pool)?),
        DataType::F32 => Volume::F32(unpack_slices(container, &pool)?),
        DataType::F64 => Volume::F64(unpack_slices(container, &pool)?),
        other @ (DataType::F16 | DataType::ComplexI16 | DataType::ComplexF32) => {
            return Err(CodecError::UnsupportedDataType(other.to_string()))
        }
    };

    debug!(
        "unpacked {} slices into {:?} {}",
        declared,
        volume.shape(),
        volume.data_type()
    );
    Ok(volume)
}

fn unpack_slices<T: Sample>(container: &Container, pool: &ThreadPool) -> Result<Array3<T>> {
    let metadata = &container.metadata;
    let range = metadata.value_range;
    let expected = metadata.slice_dims();
    let axis = Axis(metadata.slice_axis.to_index());
    let codec = get_codec(metadata.slice_format);

    if container.slices.is_empty() {
        let [d0, d1, d2] = metadata.shape;
        return Ok(Array3::from_shape_vec((d0, d1, d2), Vec::new())
            .map_err(|e| CodecError::Format(e.to_string()))?);
    }

    let results: Vec<(usize, Result<Array2<T>>)> = pool.install(|| {
        container
            .slices
            .par_iter()
            .enumerate()
            .map(|(index, blob)| (index, decode_one(codec.as_ref(), blob, index, expected, range)))
            .collect()
    });
    let slices = in_slice_order(results)?;

    let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
    ndarray::stack(axis, &views).map_err(|e| CodecError::Format(e.to_string()))
}

fn decode_one<T: Sample>(
    codec: &dyn SliceCodec,
    blob: &[u8],
    index: usize,
    expected: (usize, usize),
    range: ValueRange,
) -> Result<Array2<T>> {
    let decoded = codec.decode(blob).map_err(|e| match e {
        CodecError::CorruptSlice { reason, .. } => CodecError::CorruptSlice { index, reason },
        other => other,
    })?;
    if decoded.dim() != expected {
        return Err(CodecError::ShapeMismatch {
            index,
            expected,
            actual: decoded.dim(),
        });
    }
    Ok(decoded.mapv(|b| T::from_f64_saturating(range.dequantize(b))))
}

/// Outcome of one successful pack or unpack job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
    pub elapsed: Duration,
}

impl JobReport {
    /// Percentage by which the output is smaller than the input
    pub fn size_reduction(&self) -> f64 {
        size_reduction_percent(self.input_size, self.output_size)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} -> {} ({} -> {}, {:.2}% size reduction, {:.2}s)",
            self.input.display(),
            self.output.display(),
            format_bytes(self.input_size),
            format_bytes(self.output_size),
            self.size_reduction(),
            self.elapsed.as_secs_f64()
        )
    }
}


/// Pack an MRC file into a container file
pub async fn pack_file(input: &Path, output: &Path, config: &CodecConfig) -> Result<JobReport> {
    pack_file_with(&FileSystemIOManager::new(), input, output, config).await
}

/// [`pack_file`] through a specific storage backend
pub async fn pack_file_with(
    io: &dyn IOManager,
    input: &Path,
    output: &Path,
    config: &CodecConfig,
) -> Result<JobReport> {
    let start = Instant::now();
    if config.verbose {
        info!("{} is being packed...", input.display());
    }

    let raw = io.read(input).await?;
    let input_size = raw.len() as u64;
    let job_config = config.clone();
    let container = tokio::task::spawn_blocking(move || -> Result<Container> {
        let (header, volume) = decode_mrc(&raw)?;
        pack_with_header(&volume, Some(header), &job_config)
    })
    .await??;

    let output_size =
        write_container_with(io, output, &container.metadata, &container.slices).await?;

    let report = JobReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        input_size,
        output_size,
        elapsed: start.elapsed(),
    };
    debug!("{}", report.summary());
    Ok(report)
}

/// Unpack a container file into an MRC file
pub async fn unpack_file(input: &Path, output: &Path, config: &CodecConfig) -> Result<JobReport> {
    unpack_file_with(&FileSystemIOManager::new(), input, output, config).await
}

/// [`unpack_file`] through a specific storage backend
pub async fn unpack_file_with(
    io: &dyn IOManager,
    input: &Path,
    output: &Path,
    config: &CodecConfig,
) -> Result<JobReport> {
    let start = Instant::now();
    if config.verbose {
        info!("{} is being unpacked...", input.display());
    }

    let input_size = io.size(input).await?;
    let container = read_container_with(io, input).await?;
    let job_config = config.clone();
    let mrc = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let volume = unpack(&container, &job_config)?;
        encode_mrc(&volume, container.metadata.source_header.as_ref())
    })
    .await??;

    io.write(output, &mrc).await?;

    let report = JobReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        input_size,
        output_size: mrc.len() as u64,
        elapsed: start.elapsed(),
    };
    debug!("{}", report.summary());
    Ok(report)
}
