//! Host-owned scene inputs: meshes to voxelize, lights, camera.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().fold(Self { min: first, max: first }, |acc, &p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }
}

/// A triangle mesh placed in the world.
///
/// Moving or scaling the mesh through [`MeshInstance::set_transform`] marks
/// it dirty until the change tracker observes it.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub local_bounds: Aabb,
    position: Vec3,
    scale: Vec3,
    transform_dirty: bool,
}

impl MeshInstance {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>, position: Vec3, scale: Vec3) -> Self {
        let local_bounds = Aabb::from_points(&vertices).unwrap_or(Aabb {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        });
        Self {
            vertices,
            indices,
            local_bounds,
            position,
            scale,
            transform_dirty: false,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_transform(&mut self, position: Vec3, scale: Vec3) {
        self.position = position;
        self.scale = scale;
        self.transform_dirty = true;
    }

    /// Returns whether the transform changed since the last call, and clears the flag.
    pub fn take_transform_dirty(&mut self) -> bool {
        std::mem::take(&mut self.transform_dirty)
    }

    /// Minimum corner of the world-space bounds.
    pub fn world_min(&self) -> Vec3 {
        self.local_bounds.min * self.scale + self.position
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

/// Component-wise minimum of every mesh's world-space bounds; zero with no meshes.
pub fn scene_bounds_min(meshes: &[MeshInstance]) -> Vec3 {
    meshes
        .iter()
        .map(MeshInstance::world_min)
        .reduce(Vec3::min)
        .unwrap_or(Vec3::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Point = 0,
    Directional = 1,
    Spot = 2,
    Area = 3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
}

impl SceneLight {
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub inverse_projection: Mat4,
    pub camera_to_world: Mat4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            inverse_projection: Mat4::IDENTITY,
            camera_to_world: Mat4::IDENTITY,
        }
    }
}
