//! Mesh and light change detection.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::scene::{LightKind, MeshInstance, SceneLight};

/// Light record as the kernels read it (48-byte stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub kind: u32,
    pub direction: [f32; 3],
    pub _pad0: u32,
    pub color: [f32; 3],
    pub _pad1: u32,
}

impl GpuLight {
    pub fn capture(light: &SceneLight) -> Self {
        Self {
            position: light.position.to_array(),
            kind: light.kind as u32,
            direction: light.direction.to_array(),
            _pad0: 0,
            color: light.radiance().to_array(),
            _pad1: 0,
        }
    }
}

/// Keeps the last-seen light state and reports differences per frame.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    snapshots: Vec<GpuLight>,
    sun_direction: Option<Vec3>,
}

impl ChangeTracker {
    pub fn new(lights: &[SceneLight]) -> Self {
        let mut tracker = Self {
            snapshots: lights.iter().map(GpuLight::capture).collect(),
            sun_direction: None,
        };
        tracker.publish_sun(lights);
        tracker
    }

    /// Consumes every mesh's dirty flag. Returns whether any was set.
    pub fn observe_meshes(&mut self, meshes: &mut [MeshInstance]) -> bool {
        meshes
            .iter_mut()
            .fold(false, |changed, mesh| mesh.take_transform_dirty() | changed)
    }

    /// Compares each light against its snapshot and refreshes changed ones.
    pub fn observe_lights(&mut self, lights: &[SceneLight]) -> bool {
        let mut changed = lights.len() != self.snapshots.len();
        self.snapshots.resize(lights.len(), GpuLight::zeroed());
        for (snapshot, light) in self.snapshots.iter_mut().zip(lights) {
            let live = GpuLight::capture(light);
            if *snapshot != live {
                *snapshot = live;
                changed = true;
            }
        }
        self.publish_sun(lights);
        changed
    }

    fn publish_sun(&mut self, lights: &[SceneLight]) {
        for light in lights {
            if light.kind == LightKind::Directional {
                self.sun_direction = Some(light.direction);
            }
        }
    }

    pub fn light_data(&self) -> &[GpuLight] {
        &self.snapshots
    }

    pub fn sun_direction(&self) -> Option<Vec3> {
        self.sun_direction
    }
}
