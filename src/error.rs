//! Error types for packing and unpacking operations

use thiserror::Error;

/// Main error type for codec operations
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Volume has no samples")]
    EmptyVolume,

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid container format: {0}")]
    Format(String),

    #[error("Unsupported container version: {0}.{1}")]
    UnsupportedVersion(u16, u16),

    #[error("Truncated file: {0}")]
    Truncated(String),

    #[error("Corrupt slice {index}: {reason}")]
    CorruptSlice { index: usize, reason: String },

    #[error("Slice encoding failed: {0}")]
    Encode(String),

    #[error("Slice shape mismatch at slice {index}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Slice count mismatch: metadata declares {declared}, container holds {actual}")]
    SliceCountMismatch { declared: usize, actual: usize },

    #[error("Invalid quality {0}, must be between 1 and 100")]
    InvalidQuality(u32),

    #[error("Invalid axis: {0}")]
    InvalidAxis(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Specialized Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        CodecError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CodecError {
    fn from(err: tokio::task::JoinError) -> Self {
        CodecError::Worker(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CodecError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        CodecError::Worker(err.to_string())
    }
}

impl CodecError {
    /// Short name of the error kind, used in per-job failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::Io(_) => "IoError",
            CodecError::EmptyVolume => "EmptyVolumeError",
            CodecError::UnsupportedDataType(_) => "UnsupportedDTypeError",
            CodecError::Format(_) | CodecError::UnsupportedVersion(..) => "FormatError",
            CodecError::Truncated(_) => "TruncatedFileError",
            CodecError::CorruptSlice { .. } => "CorruptSliceError",
            CodecError::Encode(_) => "EncodeError",
            CodecError::ShapeMismatch { .. } => "ShapeMismatchError",
            CodecError::SliceCountMismatch { .. } => "SliceCountMismatchError",
            CodecError::InvalidQuality(_) | CodecError::InvalidAxis(_) => "ConfigurationError",
            CodecError::Serialization(_) => "SerializationError",
            CodecError::Worker(_) => "WorkerError",
            CodecError::NotFound(_) => "NotFoundError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CodecError::EmptyVolume.kind(), "EmptyVolumeError");
        assert_eq!(
            CodecError::SliceCountMismatch {
                declared: 5,
                actual: 4
            }
            .kind(),
            "SliceCountMismatchError"
        );
        assert_eq!(CodecError::UnsupportedVersion(9, 0).kind(), "FormatError");
    }

    #[test]
    fn test_io_conversion() {
        let err: CodecError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, CodecError::Io(_)));
        assert!(err.to_string().contains("disk"));
    }
}
