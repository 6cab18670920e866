//! Host mirrors of the kernel uniform and storage structs.
//!
//! Field order and padding match the WGSL declarations in `shaders.rs`.

use bytemuck::{Pod, Zeroable};

/// Shared per-frame uniform (`Frame` in WGSL).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub inverse_projection: [[f32; 4]; 4],
    pub camera_to_world: [[f32; 4]; 4],
    pub bounds_min: [f32; 3],
    pub frame: u32,
    pub sun_direction: [f32; 3],
    pub light_count: u32,
    pub fog_color: [f32; 3],
    pub fog_adjustment: f32,
    pub background_color: [f32; 3],
    pub reset_history: u32,
    pub volume_dims: [u32; 3],
    pub has_sdf: u32,
    pub screen_size: [u32; 2],
    pub sdf_resolution: u32,
    pub sdf_count: u32,
    pub shadow_distance_offset: u32,
    pub indirect_lighting: u32,
    pub _pad0: [u32; 2],
}

/// Per-list parameters for the volume clear, scatter, pre-pass and shading kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ScatterParams {
    pub extent: [u32; 3],
    pub entry_count: u32,
    /// Nonzero writes the secondary channel of the volume.
    pub copy1: u32,
    pub _pad0: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshParams {
    /// World position relative to the scene bounds minimum.
    pub position: [f32; 3],
    pub triangle_count: u32,
    pub scale: [f32; 3],
    pub sdf_resolution: u32,
}

pub const SDF_MODE_BUILD: u32 = 0;
pub const SDF_MODE_REINIT: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SdfParams {
    pub resolution: u32,
    pub mode: u32,
    pub site_count: u32,
    pub _pad0: u32,
}

/// One compact SDF cell's lighting state (32-byte stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SdfCell {
    pub radiance: [f32; 3],
    pub samples: f32,
    pub normal: [f32; 3],
    pub _pad0: f32,
}

/// Accumulated lighting for one primary volume entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct HistoryCell {
    pub radiance: [f32; 3],
    pub samples: f32,
}
