use std::path::PathBuf;

use thiserror::Error;

/// Structural failures while parsing a grid file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bad header: {0}")]
    BadHeader(String),
    #[error("truncated input: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("coordinate {coord:?} outside 0..=4095")]
    CoordinateOutOfRange { coord: [i32; 3] },
    #[error("grid '{grid}': duplicate root child for coarse key {key}")]
    DuplicateNode { grid: String, key: u16 },
}

/// Per-file failure during batch loading. The batch continues without the file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("{path} contains no grids")]
    NoGrids { path: PathBuf },
    #[error("worker for {path} panicked: {message}")]
    WorkerPanicked { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU adapter available")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("{label}: validation error: {message}")]
    Validation { label: &'static str, message: String },
    #[error("{label}: buffer size {bytes} bytes exceeds max {max} bytes")]
    BufferTooLarge { label: &'static str, bytes: u64, max: u64 },
    #[error("{label}: workgroups {workgroups} exceed max {max}")]
    TooManyWorkgroups { label: &'static str, workgroups: u32, max: u32 },
    #[error("buffer readback failed: {0}")]
    Readback(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
