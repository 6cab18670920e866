//! Frame pipeline execution on wgpu compute shaders.
//!
//! `VolumeRenderer` owns the device, the eight kernel pipelines and every
//! buffer they bind. Stage selection lives in [`crate::schedule`]; this
//! module only executes the resulting plans.

use log::info;

use crate::change::ChangeTracker;
use crate::config::RenderConfig;
use crate::error::GpuError;
use crate::load::{max_extent, LoadedAsset};
use crate::scene::{MeshInstance, SceneLight};
use crate::schedule::PipelineScheduler;

mod buffers;
mod frame;
mod params;
mod pipelines;
mod resources;
mod shaders;

pub use frame::FrameStats;
pub use params::{FrameUniforms, MeshParams, ScatterParams, SdfCell, SdfParams};
pub use pipelines::{Kernel, OUTPUT_FORMAT};

use pipelines::{create_pipelines, GpuPipelines};
use resources::{AssetResources, LightResources, MeshResources, SdfResources, VolumeResources};

/// Threads per workgroup of the 1D kernels.
pub const LINEAR_WORKGROUP: u32 = 64;
/// Edge of the cubic workgroups used by the 3D kernels.
pub const CUBE_WORKGROUP: u32 = 4;
/// Edge of the square workgroups used by the shading kernel.
pub const SCREEN_WORKGROUP: u32 = 8;

/// Summary of GPU device limits relevant to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuLimitsSummary {
    pub max_storage_buffer_binding_size: u64,
    pub max_buffer_size: u64,
    pub max_storage_buffers_per_shader_stage: u32,
    pub max_compute_workgroups_per_dimension: u32,
}

impl GpuLimitsSummary {
    pub fn from_limits(limits: &wgpu::Limits) -> Self {
        Self {
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size as u64,
            max_buffer_size: limits.max_buffer_size,
            max_storage_buffers_per_shader_stage: limits.max_storage_buffers_per_shader_stage,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        }
    }

    /// Validates that a buffer size fits within device limits.
    pub fn ensure_storage_fits(&self, bytes: u64, label: &'static str) -> Result<(), GpuError> {
        let max = self.max_storage_buffer_binding_size.min(self.max_buffer_size);
        if bytes > max {
            return Err(GpuError::BufferTooLarge { label, bytes, max });
        }
        Ok(())
    }

    /// Validates that the workgroup count fits within device limits.
    pub fn ensure_workgroups_fit(&self, workgroups: u32, label: &'static str) -> Result<(), GpuError> {
        if workgroups > self.max_compute_workgroups_per_dimension {
            return Err(GpuError::TooManyWorkgroups {
                label,
                workgroups,
                max: self.max_compute_workgroups_per_dimension,
            });
        }
        Ok(())
    }

    /// Workgroups for `count` invocations of a 1D kernel; rows spill into y.
    pub fn linear_dispatch(&self, count: u32, label: &'static str) -> Result<[u32; 3], GpuError> {
        let groups = count.div_ceil(LINEAR_WORKGROUP);
        let max = self.max_compute_workgroups_per_dimension.max(1);
        if groups <= max {
            return Ok([groups, 1, 1]);
        }
        let rows = groups.div_ceil(max);
        self.ensure_workgroups_fit(rows, label)?;
        Ok([max, rows, 1])
    }

    /// Workgroups covering `extent` with cubic workgroups.
    pub fn cube_dispatch(&self, extent: [u32; 3], label: &'static str) -> Result<[u32; 3], GpuError> {
        let groups = extent.map(|e| e.div_ceil(CUBE_WORKGROUP));
        for g in groups {
            self.ensure_workgroups_fit(g, label)?;
        }
        Ok(groups)
    }
}

/// Renders loaded density assets and voxelized meshes into a storage texture.
pub struct VolumeRenderer {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: GpuLimitsSummary,
    pipelines: GpuPipelines,
    config: RenderConfig,
    scheduler: PipelineScheduler,
    tracker: ChangeTracker,
    volume: VolumeResources,
    assets: Vec<AssetResources>,
    meshes: Vec<MeshResources>,
    sdf: SdfResources,
    lights: LightResources,
    frame_uniforms: wgpu::Buffer,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
}

impl VolumeRenderer {
    /// Creates the device and uploads every asset and mesh.
    ///
    /// The volume buffers are sized to the component-wise largest asset
    /// extent so any asset can be scattered into them.
    pub async fn new(
        config: RenderConfig,
        assets: &[LoadedAsset],
        meshes: &[MeshInstance],
        lights: &[SceneLight],
    ) -> Result<Self, GpuError> {
        config.validate()?;
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(GpuError::NoAdapter)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("vdb_volume.device"),
                    required_limits: adapter.limits(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        let limits = GpuLimitsSummary::from_limits(&device.limits());
        let pipelines = create_pipelines(&device).await?;

        let volume = VolumeResources::new(&device, &limits, max_extent(assets))?;
        let asset_resources = assets
            .iter()
            .map(|asset| AssetResources::new(&device, &limits, asset))
            .collect::<Result<Vec<_>, _>>()?;

        let voxelize = config.voxelize_meshes && !meshes.is_empty();
        let (mesh_resources, sdf) = if voxelize {
            let mesh_resources = meshes
                .iter()
                .map(|mesh| MeshResources::new(&device, &limits, mesh))
                .collect::<Result<Vec<_>, _>>()?;
            (mesh_resources, SdfResources::new(&device, &limits, config.sdf_resolution)?)
        } else {
            (Vec::new(), SdfResources::placeholder(&device))
        };

        let tracker = ChangeTracker::new(lights);
        let light_resources = LightResources::new(&device, tracker.light_data());
        let frame_uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vdb_volume.frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let [width, height] = config.screen_size;
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vdb_volume.output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let scheduler = PipelineScheduler::new(meshes.len(), assets.len(), voxelize);

        info!(
            "renderer ready: {} assets, volume {:?}, {} meshes, sdf {}",
            asset_resources.len(),
            volume.dims,
            mesh_resources.len(),
            if sdf.enabled { "enabled" } else { "placeholder" }
        );

        let renderer = Self {
            adapter,
            device,
            queue,
            limits,
            pipelines,
            config,
            scheduler,
            tracker,
            volume,
            assets: asset_resources,
            meshes: mesh_resources,
            sdf,
            lights: light_resources,
            frame_uniforms,
            output,
            output_view,
        };
        if renderer.sdf.enabled {
            renderer.clear_sdf()?;
        }
        Ok(renderer)
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn limits_summary(&self) -> GpuLimitsSummary {
        self.limits
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.output
    }

    /// Number of compact SDF cells after the last build.
    pub fn sdf_site_count(&self) -> u32 {
        self.sdf.site_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_groups: u32, max_bytes: u64) -> GpuLimitsSummary {
        GpuLimitsSummary {
            max_storage_buffer_binding_size: max_bytes,
            max_buffer_size: max_bytes * 2,
            max_storage_buffers_per_shader_stage: 8,
            max_compute_workgroups_per_dimension: max_groups,
        }
    }

    #[test]
    fn storage_limit_is_inclusive() {
        let limits = limits(65535, 1024);
        assert!(limits.ensure_storage_fits(1024, "buf").is_ok());
        assert!(matches!(
            limits.ensure_storage_fits(1025, "buf"),
            Err(GpuError::BufferTooLarge { bytes: 1025, max: 1024, .. })
        ));
    }

    #[test]
    fn linear_dispatch_spills_into_rows() {
        let limits = limits(100, u64::MAX / 4);
        assert_eq!(limits.linear_dispatch(0, "k").unwrap(), [0, 1, 1]);
        assert_eq!(limits.linear_dispatch(64, "k").unwrap(), [1, 1, 1]);
        assert_eq!(limits.linear_dispatch(65, "k").unwrap(), [2, 1, 1]);
        assert_eq!(limits.linear_dispatch(64 * 100, "k").unwrap(), [100, 1, 1]);
        let [x, y, _] = limits.linear_dispatch(64 * 250 + 1, "k").unwrap();
        assert_eq!((x, y), (100, 3));
        assert!(x as u64 * y as u64 * LINEAR_WORKGROUP as u64 >= 64 * 250 + 1);
    }

    #[test]
    fn linear_dispatch_rejects_too_many_rows() {
        let limits = limits(2, u64::MAX / 4);
        assert!(matches!(
            limits.linear_dispatch(64 * 5, "k"),
            Err(GpuError::TooManyWorkgroups { workgroups: 3, max: 2, .. })
        ));
    }

    #[test]
    fn cube_dispatch_rounds_up_each_axis() {
        let limits = limits(65535, u64::MAX / 4);
        assert_eq!(limits.cube_dispatch([512, 5, 1], "k").unwrap(), [128, 2, 1]);
        let tight = GpuLimitsSummary {
            max_compute_workgroups_per_dimension: 64,
            ..limits
        };
        assert!(tight.cube_dispatch([512, 512, 512], "k").is_err());
    }
}
