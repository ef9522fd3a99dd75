//! Options passed explicitly to every pack and unpack call

use crate::error::Result;
use crate::slice_codec::Quality;
use crate::types::SliceAxis;
use serde::{Deserialize, Serialize};

/// Number of processing units available to this process
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Effective option set for one pack or unpack job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// JPEG quality used when packing
    pub quality: Quality,

    /// Worker threads for per-slice work (at least 1)
    pub cores: usize,

    /// Axis along which volumes are sliced when packing
    pub slice_axis: SliceAxis,

    /// Log per-job details
    pub verbose: bool,
}

impl CodecConfig {
    /// Create a config with default quality and all available cores
    pub fn new() -> Self {
        Self {
            quality: Quality::default(),
            cores: available_cores(),
            slice_axis: SliceAxis::default(),
            verbose: false,
        }
    }

    /// Set quality, rejecting values outside 1-100
    pub fn with_quality(mut self, quality: u32) -> Result<Self> {
        self.quality = Quality::new(quality)?;
        Ok(self)
    }

    /// Set the worker count (clamped to at least 1)
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// Set the slicing axis
    pub fn with_slice_axis(mut self, axis: SliceAxis) -> Self {
        self.slice_axis = axis;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new()
    }
}
