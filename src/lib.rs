//! jpgstack - lossy JPEG stacks for tomogram volumes
//!
//! Packs dense 3D volumes (MRC / `.rec` files) into a `.jpgs` container
//! holding one grayscale JPEG per slice plus the metadata needed to undo
//! the intensity normalization, and unpacks such containers back into
//! approximate volumes of the original shape and element type.
//!
//! At the default quality of 80 a packed tomogram is roughly a tenth of
//! its original size. The round trip is lossy: use the output for
//! visualization and annotation, not for downstream processing.
//!
//! # Example
//!
//! ```rust,no_run
//! use jpgstack::{pack, unpack, CodecConfig, Volume};
//! use ndarray::Array3;
//!
//! # fn example() -> jpgstack::Result<()> {
//! let volume = Volume::from(Array3::<f32>::zeros((64, 256, 256)));
//! let config = CodecConfig::new().with_quality(90)?;
//!
//! let container = pack(&volume, &config)?;
//! let restored = unpack(&container, &config)?;
//! assert_eq!(restored.shape(), volume.shape());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod io;
pub mod mrc;
pub mod normalize;
pub mod slice_codec;
pub mod types;
pub mod utils;
pub mod volume;

// Re-exports
pub use batch::{run_batch, BatchSummary, Job, JobMode, JobOutcome};
pub use codec::{pack, pack_file, unpack, unpack_file, JobReport};
pub use config::CodecConfig;
pub use container::{read_container, write_container, Container, ContainerMetadata};
pub use error::{CodecError, Result};
pub use io::{FileSystemIOManager, IOManager};
pub use normalize::{compute_range, dequantize, quantize};
pub use slice_codec::{decode_slice, encode_slice, Quality, SliceCodec, SliceFormat};
pub use types::{DataType, SliceAxis, ValueRange};
pub use volume::{Sample, Volume};

/// Version of jpgstack
pub const JPGSTACK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!JPGSTACK_VERSION.is_empty());
    }
}
