use crate::error::GpuError;

use super::shaders::{
    COMMON_WGSL, PREPASS_WGSL, SCATTER_WGSL, SDF_BUILD_WGSL, SDF_CLEAR_WGSL, SDF_LIGHT_WGSL,
    SHADE_WGSL, VOLUME_CLEAR_WGSL, VOXELIZE_WGSL,
};

/// The eight compute kernels, numbered by their fixed entry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Shade = 0,
    VolumeScatter = 1,
    VolumePrepass = 2,
    VolumeClear = 3,
    Voxelize = 4,
    SdfClear = 5,
    SdfLight = 6,
    SdfBuild = 7,
}

impl Kernel {
    pub const ALL: [Kernel; 8] = [
        Kernel::Shade,
        Kernel::VolumeScatter,
        Kernel::VolumePrepass,
        Kernel::VolumeClear,
        Kernel::Voxelize,
        Kernel::SdfClear,
        Kernel::SdfLight,
        Kernel::SdfBuild,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::Shade => "vdb_volume.shade",
            Kernel::VolumeScatter => "vdb_volume.volume_scatter",
            Kernel::VolumePrepass => "vdb_volume.volume_prepass",
            Kernel::VolumeClear => "vdb_volume.volume_clear",
            Kernel::Voxelize => "vdb_volume.voxelize",
            Kernel::SdfClear => "vdb_volume.sdf_clear",
            Kernel::SdfLight => "vdb_volume.sdf_light",
            Kernel::SdfBuild => "vdb_volume.sdf_build",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Kernel::Shade => SHADE_WGSL,
            Kernel::VolumeScatter => SCATTER_WGSL,
            Kernel::VolumePrepass => PREPASS_WGSL,
            Kernel::VolumeClear => VOLUME_CLEAR_WGSL,
            Kernel::Voxelize => VOXELIZE_WGSL,
            Kernel::SdfClear => SDF_CLEAR_WGSL,
            Kernel::SdfLight => SDF_LIGHT_WGSL,
            Kernel::SdfBuild => SDF_BUILD_WGSL,
        }
    }

    pub fn source(self) -> String {
        format!("{COMMON_WGSL}{}", self.body())
    }

    /// Binding table, indexed by binding number.
    pub fn slots(self) -> &'static [Slot] {
        use Slot::*;
        match self {
            Kernel::Shade => &[
                Uniform,
                Uniform,
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: true },
                OutputTexture,
            ],
            Kernel::VolumeScatter => &[
                Uniform,
                Uniform,
                Storage { read_only: true },
                Storage { read_only: false },
                Storage { read_only: false },
            ],
            Kernel::VolumePrepass => &[
                Uniform,
                Uniform,
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: false },
                Storage { read_only: false },
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: true },
            ],
            Kernel::VolumeClear => &[
                Uniform,
                Uniform,
                Storage { read_only: false },
                Storage { read_only: false },
            ],
            Kernel::Voxelize => &[
                Uniform,
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: false },
                Storage { read_only: false },
            ],
            Kernel::SdfClear => &[
                Uniform,
                Storage { read_only: false },
                Storage { read_only: false },
            ],
            Kernel::SdfLight => &[
                Uniform,
                Uniform,
                Storage { read_only: true },
                Storage { read_only: false },
                Storage { read_only: true },
                Storage { read_only: true },
                Storage { read_only: true },
            ],
            Kernel::SdfBuild => &[
                Uniform,
                Storage { read_only: false },
                Storage { read_only: false },
                Storage { read_only: false },
                Storage { read_only: false },
                Storage { read_only: false },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Uniform,
    Storage { read_only: bool },
    OutputTexture,
}

impl Slot {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Slot::Uniform => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Slot::Storage { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            Slot::OutputTexture => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: OUTPUT_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

pub struct KernelPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

pub struct GpuPipelines {
    kernels: Vec<KernelPipeline>,
}

impl GpuPipelines {
    pub fn get(&self, kernel: Kernel) -> &KernelPipeline {
        &self.kernels[kernel as usize]
    }
}

pub async fn create_pipelines(device: &wgpu::Device) -> Result<GpuPipelines, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let kernels = Kernel::ALL
        .iter()
        .map(|&kernel| create_kernel(device, kernel))
        .collect();
    if let Some(err) = device.pop_error_scope().await {
        return Err(GpuError::Validation {
            label: "vdb_volume.pipelines",
            message: err.to_string(),
        });
    }
    Ok(GpuPipelines { kernels })
}

fn create_kernel(device: &wgpu::Device, kernel: Kernel) -> KernelPipeline {
    let label = kernel.label();
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
    });
    let entries: Vec<wgpu::BindGroupLayoutEntry> = kernel
        .slots()
        .iter()
        .enumerate()
        .map(|(binding, slot)| slot.layout_entry(binding as u32))
        .collect();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: "main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    KernelPipeline {
        pipeline,
        bind_group_layout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(source: &str, binding: usize) -> Option<&str> {
        let marker = format!("@binding({binding}) var");
        let start = source.find(&marker)? + marker.len();
        source[start..].lines().next()
    }

    #[test]
    fn kernel_indices_are_fixed() {
        for (index, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(*kernel as usize, index);
        }
    }

    #[test]
    fn shader_bindings_match_layout_tables() {
        for kernel in Kernel::ALL {
            let source = kernel.source();
            let slots = kernel.slots();
            assert_eq!(
                source.matches("@binding(").count(),
                slots.len(),
                "{}: binding count",
                kernel.label()
            );
            for (binding, slot) in slots.iter().enumerate() {
                let decl = declaration(&source, binding)
                    .unwrap_or_else(|| panic!("{}: binding {binding} missing", kernel.label()));
                let expected = match slot {
                    Slot::Uniform => "<uniform>",
                    Slot::Storage { read_only: true } => "<storage, read>",
                    Slot::Storage { read_only: false } => "<storage, read_write>",
                    Slot::OutputTexture => "texture_storage_2d<rgba32float, write>",
                };
                assert!(
                    decl.contains(expected),
                    "{} binding {binding}: `{decl}` lacks `{expected}`",
                    kernel.label()
                );
            }
        }
    }

    #[test]
    fn every_kernel_has_an_entry_point() {
        for kernel in Kernel::ALL {
            assert!(kernel.source().contains("fn main("), "{}", kernel.label());
        }
    }

    #[test]
    fn storage_bindings_fit_default_limit() {
        let default_limit = wgpu::Limits::default().max_storage_buffers_per_shader_stage as usize;
        for kernel in Kernel::ALL {
            let storage = kernel
                .slots()
                .iter()
                .filter(|slot| matches!(slot, Slot::Storage { .. }))
                .count();
            assert!(storage <= default_limit, "{}: {storage} storage buffers", kernel.label());
        }
    }

    #[test]
    fn volume_reads_never_see_another_assets_density() {
        let clear = Kernel::VolumeClear.source();
        let body = &clear[clear.find("fn main(").expect("entry point")..];
        assert!(body.contains("gid >= globals.volume_dims"));
        assert!(!body.contains("params.extent"));

        let prepass = Kernel::VolumePrepass.source();
        assert!(prepass.contains("in_dims(p, min(params.extent, globals.volume_dims))"));
    }

    #[test]
    fn workgroup_sizes_match_dispatch_math() {
        use crate::gpu::{CUBE_WORKGROUP, LINEAR_WORKGROUP, SCREEN_WORKGROUP};

        let linear = format!("@workgroup_size({LINEAR_WORKGROUP})");
        let cube = format!("@workgroup_size({0}, {0}, {0})", CUBE_WORKGROUP);
        let screen = format!("@workgroup_size({0}, {0})", SCREEN_WORKGROUP);
        for kernel in Kernel::ALL {
            let expected = match kernel {
                Kernel::Shade => &screen,
                Kernel::VolumeClear | Kernel::SdfClear | Kernel::SdfBuild => &cube,
                Kernel::VolumeScatter | Kernel::VolumePrepass | Kernel::Voxelize | Kernel::SdfLight => &linear,
            };
            assert!(kernel.source().contains(expected.as_str()), "{}", kernel.label());
        }
    }
}
