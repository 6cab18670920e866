//! Device buffers owned by the renderer.

use bytemuck::Zeroable;
use glam::Vec3;
use log::info;

use crate::change::GpuLight;
use crate::core::{ExtractedGrid, SparseVoxelEntry};
use crate::error::GpuError;
use crate::load::LoadedAsset;
use crate::scene::MeshInstance;

use super::buffers::{storage_buffer, storage_buffer_init, uniform_buffer};
use super::params::{
    HistoryCell, MeshParams, ScatterParams, SdfCell, SdfParams, SDF_MODE_BUILD, SDF_MODE_REINIT,
};
use super::GpuLimitsSummary;

const VOLUME_CELL_BYTES: u64 = 8;
const ENTRY_BYTES: u64 = std::mem::size_of::<SparseVoxelEntry>() as u64;
const HISTORY_BYTES: u64 = std::mem::size_of::<HistoryCell>() as u64;
const SDF_CELL_BYTES: u64 = std::mem::size_of::<SdfCell>() as u64;
const LIGHT_BYTES: u64 = std::mem::size_of::<GpuLight>() as u64;
pub(crate) const COUNTER_BYTES: u64 = 8;

/// Dense density volume plus its per-cell shadow terms.
pub struct VolumeResources {
    pub volume: wgpu::Buffer,
    pub shadow: wgpu::Buffer,
    /// Zero-extent scatter parameters, bound for shading when there are no assets.
    pub empty_params: wgpu::Buffer,
    pub dims: [u32; 3],
}

impl VolumeResources {
    pub fn new(device: &wgpu::Device, limits: &GpuLimitsSummary, dims: [u32; 3]) -> Result<Self, GpuError> {
        let dims = dims.map(|d| d.max(1));
        let cells: u64 = dims.iter().map(|&d| d as u64).product();
        let bytes = cells.saturating_mul(VOLUME_CELL_BYTES);
        limits.ensure_storage_fits(bytes, "vdb_volume.volume")?;
        Ok(Self {
            volume: storage_buffer(device, "vdb_volume.volume", bytes, VOLUME_CELL_BYTES, wgpu::BufferUsages::empty()),
            shadow: storage_buffer(device, "vdb_volume.shadow", bytes, VOLUME_CELL_BYTES, wgpu::BufferUsages::empty()),
            empty_params: uniform_buffer(device, "vdb_volume.volume.empty_params", &ScatterParams::zeroed()),
            dims,
        })
    }
}

/// One uploaded sparse list and its scatter parameters.
pub struct EntryList {
    pub entries: wgpu::Buffer,
    pub params: wgpu::Buffer,
    pub count: u32,
}

impl EntryList {
    fn new(
        device: &wgpu::Device,
        limits: &GpuLimitsSummary,
        grid: &ExtractedGrid,
        extent: [u32; 3],
        copy1: bool,
    ) -> Result<Self, GpuError> {
        let label = if copy1 {
            "vdb_volume.asset.secondary"
        } else {
            "vdb_volume.asset.primary"
        };
        let bytes = (grid.entries.len() as u64).saturating_mul(ENTRY_BYTES);
        limits.ensure_storage_fits(bytes, label)?;
        let count = grid.entries.len() as u32;
        let params = ScatterParams {
            extent,
            entry_count: count,
            copy1: copy1 as u32,
            _pad0: [0; 3],
        };
        Ok(Self {
            entries: storage_buffer_init(device, label, bytemuck::cast_slice(&grid.entries), ENTRY_BYTES),
            params: uniform_buffer(device, "vdb_volume.asset.scatter_params", &params),
            count,
        })
    }
}

pub struct AssetResources {
    pub primary: EntryList,
    pub secondary: Option<EntryList>,
    /// Accumulated lighting per primary entry.
    pub history: wgpu::Buffer,
    pub extent: [u32; 3],
}

impl AssetResources {
    pub fn new(device: &wgpu::Device, limits: &GpuLimitsSummary, asset: &LoadedAsset) -> Result<Self, GpuError> {
        let primary = EntryList::new(device, limits, &asset.primary, asset.extent, false)?;
        let secondary = asset
            .secondary
            .as_ref()
            .map(|grid| EntryList::new(device, limits, grid, asset.extent, true))
            .transpose()?;
        let history_bytes = (primary.count as u64).saturating_mul(HISTORY_BYTES);
        limits.ensure_storage_fits(history_bytes, "vdb_volume.asset.history")?;
        Ok(Self {
            history: storage_buffer(
                device,
                "vdb_volume.asset.history",
                history_bytes,
                HISTORY_BYTES,
                wgpu::BufferUsages::empty(),
            ),
            primary,
            secondary,
            extent: asset.extent,
        })
    }
}

pub struct MeshResources {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub params: wgpu::Buffer,
    pub triangle_count: u32,
}

impl MeshResources {
    pub fn new(device: &wgpu::Device, limits: &GpuLimitsSummary, mesh: &MeshInstance) -> Result<Self, GpuError> {
        let vertices: Vec<[f32; 4]> = mesh.vertices.iter().map(|v| v.extend(1.0).to_array()).collect();
        limits.ensure_storage_fits((vertices.len() as u64) * 16, "vdb_volume.mesh.vertices")?;
        limits.ensure_storage_fits((mesh.indices.len() as u64) * 4, "vdb_volume.mesh.indices")?;
        Ok(Self {
            vertices: storage_buffer_init(device, "vdb_volume.mesh.vertices", bytemuck::cast_slice(&vertices), 16),
            indices: storage_buffer_init(device, "vdb_volume.mesh.indices", bytemuck::cast_slice(&mesh.indices), 12),
            params: uniform_buffer(device, "vdb_volume.mesh.params", &MeshParams::zeroed()),
            triangle_count: mesh.triangle_count(),
        })
    }

    /// Places the mesh relative to the current scene bounds.
    pub fn write_params(&self, queue: &wgpu::Queue, mesh: &MeshInstance, bounds_min: Vec3, sdf_resolution: u32) {
        let params = MeshParams {
            position: (mesh.position() - bounds_min).to_array(),
            triangle_count: self.triangle_count,
            scale: mesh.scale().to_array(),
            sdf_resolution,
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
    }
}

/// SDF accumulation volume, its dense index and the compact site buffers.
///
/// `sites` and `cells` hold exactly `site_count` elements (one when empty)
/// and are replaced by [`SdfResources::reallocate`].
pub struct SdfResources {
    pub resolution: u32,
    pub enabled: bool,
    pub occupancy: wgpu::Buffer,
    pub index: wgpu::Buffer,
    pub counter: wgpu::Buffer,
    pub readback: wgpu::Buffer,
    pub sites: wgpu::Buffer,
    pub cells: wgpu::Buffer,
    pub site_count: u32,
    pub build_params: wgpu::Buffer,
    pub reinit_params: wgpu::Buffer,
}

impl SdfResources {
    pub fn new(device: &wgpu::Device, limits: &GpuLimitsSummary, resolution: u32) -> Result<Self, GpuError> {
        let cells = (resolution as u64).pow(3);
        let occupancy_bytes = cells.div_ceil(32) * 4;
        let index_bytes = cells * 4;
        limits.ensure_storage_fits(occupancy_bytes, "vdb_volume.sdf.occupancy")?;
        limits.ensure_storage_fits(index_bytes, "vdb_volume.sdf.index")?;
        Ok(Self::allocate(device, resolution, true, occupancy_bytes, index_bytes))
    }

    /// 1-element buffers bound when there is nothing to voxelize.
    pub fn placeholder(device: &wgpu::Device) -> Self {
        Self::allocate(device, 1, false, 4, 4)
    }

    fn allocate(device: &wgpu::Device, resolution: u32, enabled: bool, occupancy_bytes: u64, index_bytes: u64) -> Self {
        let params = |mode| SdfParams {
            resolution,
            mode,
            site_count: 0,
            _pad0: 0,
        };
        Self {
            resolution,
            enabled,
            occupancy: storage_buffer(device, "vdb_volume.sdf.occupancy", occupancy_bytes, 4, wgpu::BufferUsages::empty()),
            index: storage_buffer(device, "vdb_volume.sdf.index", index_bytes, 4, wgpu::BufferUsages::empty()),
            counter: storage_buffer(
                device,
                "vdb_volume.sdf.counter",
                COUNTER_BYTES,
                COUNTER_BYTES,
                wgpu::BufferUsages::COPY_SRC,
            ),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("vdb_volume.sdf.counter_readback"),
                size: COUNTER_BYTES,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            sites: storage_buffer(device, "vdb_volume.sdf.sites", 4, 4, wgpu::BufferUsages::empty()),
            cells: storage_buffer(device, "vdb_volume.sdf.cells", SDF_CELL_BYTES, SDF_CELL_BYTES, wgpu::BufferUsages::empty()),
            site_count: 0,
            build_params: uniform_buffer(device, "vdb_volume.sdf.build_params", &params(SDF_MODE_BUILD)),
            reinit_params: uniform_buffer(device, "vdb_volume.sdf.reinit_params", &params(SDF_MODE_REINIT)),
        }
    }

    /// Replaces the compact buffers with ones holding exactly `count` sites.
    /// Must run after the counter readback and before anything binds them.
    pub fn reallocate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        limits: &GpuLimitsSummary,
        count: u32,
    ) -> Result<(), GpuError> {
        let len = count.max(1) as u64;
        limits.ensure_storage_fits(len * 4, "vdb_volume.sdf.sites")?;
        limits.ensure_storage_fits(len * SDF_CELL_BYTES, "vdb_volume.sdf.cells")?;
        self.sites = storage_buffer(device, "vdb_volume.sdf.sites", len * 4, 4, wgpu::BufferUsages::empty());
        self.cells = storage_buffer(device, "vdb_volume.sdf.cells", len * SDF_CELL_BYTES, SDF_CELL_BYTES, wgpu::BufferUsages::empty());
        self.site_count = count;
        let params = SdfParams {
            resolution: self.resolution,
            mode: SDF_MODE_BUILD,
            site_count: count,
            _pad0: 0,
        };
        queue.write_buffer(&self.build_params, 0, bytemuck::bytes_of(&params));
        info!("sdf reallocated for {count} sites");
        Ok(())
    }
}

/// Light buffer that grows when the scene gains lights.
pub struct LightResources {
    pub buffer: wgpu::Buffer,
    capacity: usize,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, lights: &[GpuLight]) -> Self {
        Self {
            buffer: storage_buffer_init(device, "vdb_volume.lights", bytemuck::cast_slice(lights), LIGHT_BYTES),
            capacity: lights.len().max(1),
        }
    }

    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, lights: &[GpuLight]) {
        if lights.len() > self.capacity {
            *self = Self::new(device, lights);
        } else if !lights.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(lights));
        }
    }
}
