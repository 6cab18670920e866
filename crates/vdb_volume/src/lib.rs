pub mod change;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod gpu;
pub mod grid;
pub mod load;
pub mod scene;
pub mod schedule;

pub use crate::change::{ChangeTracker, GpuLight};
pub use crate::config::{LoadConfig, RenderConfig};
pub use crate::core::{BitKeys, ExtractedGrid, SparseVoxelEntry};
pub use crate::error::{ConfigError, DecodeError, GpuError, LoadError};
pub use crate::extract::{extract, extract_grid};
pub use crate::gpu::{FrameStats, GpuLimitsSummary, VolumeRenderer};
pub use crate::grid::SparseGrid;
pub use crate::load::{LoadOrchestrator, LoadReport, LoadedAsset};
pub use crate::scene::{CameraMatrices, LightKind, MeshInstance, SceneLight};
pub use crate::schedule::{FrameInput, FramePlan, PipelineScheduler, SdfPhase, Stage};
