use glam::Vec3;
use log::{debug, trace, warn};

use crate::error::GpuError;
use crate::scene::{scene_bounds_min, CameraMatrices, MeshInstance, SceneLight};
use crate::schedule::{FrameInput, FramePlan, Stage};

use super::buffers::map_buffer_u32;
use super::params::FrameUniforms;
use super::pipelines::Kernel;
use super::resources::{AssetResources, COUNTER_BYTES};
use super::{VolumeRenderer, SCREEN_WORKGROUP};

/// What one call to [`VolumeRenderer::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame: u32,
    pub dispatches: u32,
    pub volume_rebuilt: bool,
    pub history_reset: bool,
    pub sdf_sites: u32,
}

impl VolumeRenderer {
    /// Runs one frame: change detection, planning, then every planned stage
    /// in dependency order. Blocks on the counter readback in the frame that
    /// builds the SDF.
    pub async fn render_frame(
        &mut self,
        meshes: &mut [MeshInstance],
        lights: &[SceneLight],
        camera: &CameraMatrices,
    ) -> Result<FrameStats, GpuError> {
        let mesh_changed = self.tracker.observe_meshes(meshes);
        let light_changed = self.tracker.observe_lights(lights);
        let plan = self.scheduler.plan_frame(FrameInput {
            mesh_changed,
            light_changed,
            bounds_min: scene_bounds_min(meshes),
        });

        if plan.upload_lights {
            self.lights
                .upload(&self.device, &self.queue, self.tracker.light_data());
        }
        self.write_frame_uniforms(&plan, camera);
        if plan.sdf_reinit {
            self.queue
                .write_buffer(&self.sdf.counter, 0, bytemuck::cast_slice(&[0u32, 0u32]));
        }

        let active = plan.active_asset.and_then(|index| self.assets.get(index));
        let has_secondary = active.is_some_and(|asset| asset.secondary.is_some());
        let mut encoder = self.encoder("vdb_volume.frame");
        let mut dispatches = 0;
        for stage in plan.stages(has_secondary) {
            trace!("frame {}: {:?}", plan.frame, stage);
            match stage {
                Stage::SdfReinit => {
                    self.dispatch_sdf_build(&mut encoder, &self.sdf.reinit_params)?;
                }
                Stage::Voxelize { mesh_index } => {
                    let Some(mesh) = meshes.get(mesh_index) else {
                        warn!("mesh {mesh_index} disappeared before voxelization");
                        continue;
                    };
                    self.dispatch_voxelize(&mut encoder, mesh, mesh_index, plan.bounds_min)?;
                }
                Stage::BuildSdf => {
                    encoder = self.build_sdf(encoder).await?;
                    self.write_frame_uniforms(&plan, camera);
                }
                Stage::LightSdf => self.dispatch_sdf_light(&mut encoder)?,
                Stage::VolumeClear | Stage::VolumeScatter { .. } | Stage::VolumePrepass => {
                    let Some(index) = plan.active_asset else {
                        continue;
                    };
                    self.dispatch_volume_stage(&mut encoder, stage, &self.assets[index])?;
                }
                Stage::Shade => self.dispatch_shade(&mut encoder, plan.active_asset),
            }
            dispatches += 1;
        }
        self.queue.submit([encoder.finish()]);

        Ok(FrameStats {
            frame: plan.frame,
            dispatches,
            volume_rebuilt: plan.rebuild_volume,
            history_reset: plan.reset_history,
            sdf_sites: self.sdf.site_count,
        })
    }

    fn write_frame_uniforms(&self, plan: &FramePlan, camera: &CameraMatrices) {
        let uniforms = FrameUniforms {
            inverse_projection: camera.inverse_projection.to_cols_array_2d(),
            camera_to_world: camera.camera_to_world.to_cols_array_2d(),
            bounds_min: plan.bounds_min.to_array(),
            frame: plan.frame,
            sun_direction: self.tracker.sun_direction().unwrap_or(Vec3::NEG_Y).to_array(),
            light_count: self.tracker.light_data().len() as u32,
            fog_color: self.config.fog_color,
            fog_adjustment: self.config.fog_adjustment,
            background_color: self.config.background_color,
            reset_history: plan.reset_history as u32,
            volume_dims: self.volume.dims,
            has_sdf: (self.sdf.enabled && self.sdf.site_count > 0) as u32,
            screen_size: self.config.screen_size,
            sdf_resolution: self.sdf.resolution,
            sdf_count: self.sdf.site_count,
            shadow_distance_offset: self.config.shadow_distance_offset,
            indirect_lighting: self.config.indirect_lighting as u32,
            _pad0: [0; 2],
        };
        self.queue
            .write_buffer(&self.frame_uniforms, 0, bytemuck::bytes_of(&uniforms));
    }

    fn encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Binds `resources` in binding order and records one dispatch.
    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Kernel,
        resources: Vec<wgpu::BindingResource<'_>>,
        workgroups: [u32; 3],
    ) {
        let kernel_pipeline = self.pipelines.get(kernel);
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .into_iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &kernel_pipeline.bind_group_layout,
            entries: &entries,
        });
        let [x, y, z] = workgroups;
        trace!("{}: dispatch {x}x{y}x{z}", kernel.label());
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel_pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
    }

    /// Kernel 5 over the whole accumulation volume. Runs once at setup.
    pub(super) fn clear_sdf(&self) -> Result<(), GpuError> {
        let res = self.sdf.resolution;
        let workgroups = self.limits.cube_dispatch([res; 3], Kernel::SdfClear.label())?;
        let mut encoder = self.encoder("vdb_volume.sdf_clear");
        self.dispatch(
            &mut encoder,
            Kernel::SdfClear,
            vec![
                self.sdf.reinit_params.as_entire_binding(),
                self.sdf.occupancy.as_entire_binding(),
                self.sdf.index.as_entire_binding(),
            ],
            workgroups,
        );
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn dispatch_sdf_build(&self, encoder: &mut wgpu::CommandEncoder, params: &wgpu::Buffer) -> Result<(), GpuError> {
        let res = self.sdf.resolution;
        let workgroups = self.limits.cube_dispatch([res; 3], Kernel::SdfBuild.label())?;
        self.dispatch(
            encoder,
            Kernel::SdfBuild,
            vec![
                params.as_entire_binding(),
                self.sdf.occupancy.as_entire_binding(),
                self.sdf.index.as_entire_binding(),
                self.sdf.sites.as_entire_binding(),
                self.sdf.cells.as_entire_binding(),
                self.sdf.counter.as_entire_binding(),
            ],
            workgroups,
        );
        Ok(())
    }

    fn dispatch_voxelize(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        mesh: &MeshInstance,
        mesh_index: usize,
        bounds_min: Vec3,
    ) -> Result<(), GpuError> {
        let resources = &self.meshes[mesh_index];
        resources.write_params(&self.queue, mesh, bounds_min, self.sdf.resolution);
        let workgroups = self
            .limits
            .linear_dispatch(resources.triangle_count, Kernel::Voxelize.label())?;
        self.dispatch(
            encoder,
            Kernel::Voxelize,
            vec![
                resources.params.as_entire_binding(),
                resources.vertices.as_entire_binding(),
                resources.indices.as_entire_binding(),
                self.sdf.occupancy.as_entire_binding(),
                self.sdf.counter.as_entire_binding(),
            ],
            workgroups,
        );
        Ok(())
    }

    /// Submits the work so far, reads the touched-cell count back, resizes
    /// the compact buffers to it and records the build on a fresh encoder.
    async fn build_sdf(&mut self, mut encoder: wgpu::CommandEncoder) -> Result<wgpu::CommandEncoder, GpuError> {
        encoder.copy_buffer_to_buffer(&self.sdf.counter, 0, &self.sdf.readback, 0, COUNTER_BYTES);
        self.queue.submit([encoder.finish()]);
        let counts = map_buffer_u32(&self.sdf.readback, &self.device).await?;
        let touched = counts.first().copied().unwrap_or(0);
        debug!("sdf counter readback: {touched} touched cells");

        self.sdf
            .reallocate(&self.device, &self.queue, &self.limits, touched)?;
        self.queue
            .write_buffer(&self.sdf.counter, 4, bytemuck::bytes_of(&0u32));

        let mut encoder = self.encoder("vdb_volume.frame.sdf_build");
        self.dispatch_sdf_build(&mut encoder, &self.sdf.build_params)?;
        Ok(encoder)
    }

    fn dispatch_sdf_light(&self, encoder: &mut wgpu::CommandEncoder) -> Result<(), GpuError> {
        let workgroups = self
            .limits
            .linear_dispatch(self.sdf.site_count, Kernel::SdfLight.label())?;
        self.dispatch(
            encoder,
            Kernel::SdfLight,
            vec![
                self.frame_uniforms.as_entire_binding(),
                self.sdf.build_params.as_entire_binding(),
                self.sdf.sites.as_entire_binding(),
                self.sdf.cells.as_entire_binding(),
                self.lights.buffer.as_entire_binding(),
                self.volume.volume.as_entire_binding(),
                self.sdf.occupancy.as_entire_binding(),
            ],
            workgroups,
        );
        Ok(())
    }

    fn dispatch_volume_stage(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        stage: Stage,
        asset: &AssetResources,
    ) -> Result<(), GpuError> {
        match stage {
            Stage::VolumeClear => {
                let workgroups = self
                    .limits
                    .cube_dispatch(self.volume.dims, Kernel::VolumeClear.label())?;
                self.dispatch(
                    encoder,
                    Kernel::VolumeClear,
                    vec![
                        self.frame_uniforms.as_entire_binding(),
                        asset.primary.params.as_entire_binding(),
                        self.volume.volume.as_entire_binding(),
                        self.volume.shadow.as_entire_binding(),
                    ],
                    workgroups,
                );
            }
            Stage::VolumeScatter { secondary } => {
                let list = if secondary {
                    match &asset.secondary {
                        Some(list) => list,
                        None => return Ok(()),
                    }
                } else {
                    &asset.primary
                };
                let workgroups = self
                    .limits
                    .linear_dispatch(list.count, Kernel::VolumeScatter.label())?;
                self.dispatch(
                    encoder,
                    Kernel::VolumeScatter,
                    vec![
                        self.frame_uniforms.as_entire_binding(),
                        list.params.as_entire_binding(),
                        list.entries.as_entire_binding(),
                        self.volume.volume.as_entire_binding(),
                        self.volume.shadow.as_entire_binding(),
                    ],
                    workgroups,
                );
            }
            Stage::VolumePrepass => {
                let workgroups = self
                    .limits
                    .linear_dispatch(asset.primary.count, Kernel::VolumePrepass.label())?;
                self.dispatch(
                    encoder,
                    Kernel::VolumePrepass,
                    vec![
                        self.frame_uniforms.as_entire_binding(),
                        asset.primary.params.as_entire_binding(),
                        asset.primary.entries.as_entire_binding(),
                        self.volume.volume.as_entire_binding(),
                        self.volume.shadow.as_entire_binding(),
                        asset.history.as_entire_binding(),
                        self.lights.buffer.as_entire_binding(),
                        self.sdf.index.as_entire_binding(),
                        self.sdf.cells.as_entire_binding(),
                    ],
                    workgroups,
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Kernel 0 at screen / 8. Without assets the extent uniform of an empty
    /// volume is bound, so only the SDF and the background are drawn.
    fn dispatch_shade(&self, encoder: &mut wgpu::CommandEncoder, active_asset: Option<usize>) {
        let params = match active_asset.and_then(|index| self.assets.get(index)) {
            Some(asset) => &asset.primary.params,
            None => &self.volume.empty_params,
        };
        let [width, height] = self.config.screen_size;
        self.dispatch(
            encoder,
            Kernel::Shade,
            vec![
                self.frame_uniforms.as_entire_binding(),
                params.as_entire_binding(),
                self.volume.volume.as_entire_binding(),
                self.volume.shadow.as_entire_binding(),
                self.lights.buffer.as_entire_binding(),
                self.sdf.index.as_entire_binding(),
                self.sdf.cells.as_entire_binding(),
                wgpu::BindingResource::TextureView(&self.output_view),
            ],
            [
                width.div_ceil(SCREEN_WORKGROUP),
                height.div_ceil(SCREEN_WORKGROUP),
                1,
            ],
        );
    }
}
