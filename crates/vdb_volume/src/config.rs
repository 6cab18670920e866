use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest SDF edge whose cell indices still fit in a `u32`.
pub const MAX_SDF_RESOLUTION: u32 = 1024;

/// Options recognised by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Voxelize scene meshes into the SDF. Forced off when there are no meshes.
    pub voxelize_meshes: bool,
    pub indirect_lighting: bool,
    pub fog_adjustment: f32,
    pub fog_color: [f32; 3],
    pub background_color: [f32; 3],
    /// Valid range `1..=10`.
    pub shadow_distance_offset: u32,
    /// Edge length of the cubic SDF volume, multiple of 8.
    pub sdf_resolution: u32,
    pub screen_size: [u32; 2],
}

impl Default for RenderConfig {
    fn default() -> Self {
        let fog = 75.0 / 255.0;
        Self {
            voxelize_meshes: true,
            indirect_lighting: true,
            fog_adjustment: 1.0,
            fog_color: [fog, fog, fog],
            background_color: [0.1, 0.1, 0.1],
            shadow_distance_offset: 1,
            sdf_resolution: 512,
            screen_size: [1280, 720],
        }
    }
}

impl RenderConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.shadow_distance_offset) {
            return Err(ConfigError::Invalid {
                field: "shadow_distance_offset",
                reason: format!("must be in 1..=10 (got {})", self.shadow_distance_offset),
            });
        }
        if self.sdf_resolution == 0
            || self.sdf_resolution % 8 != 0
            || self.sdf_resolution > MAX_SDF_RESOLUTION
        {
            return Err(ConfigError::Invalid {
                field: "sdf_resolution",
                reason: format!(
                    "must be a non-zero multiple of 8 up to {MAX_SDF_RESOLUTION} (got {})",
                    self.sdf_resolution
                ),
            });
        }
        if !self.fog_adjustment.is_finite() {
            return Err(ConfigError::Invalid {
                field: "fog_adjustment",
                reason: "must be finite".into(),
            });
        }
        let mut colors = self.fog_color.iter().chain(self.background_color.iter());
        if colors.any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "fog_color/background_color",
                reason: "components must be finite".into(),
            });
        }
        if self.screen_size.iter().any(|&d| d == 0) {
            return Err(ConfigError::Invalid {
                field: "screen_size",
                reason: "dimensions must be >= 1".into(),
            });
        }
        Ok(())
    }

    pub fn sdf_cells(&self) -> u64 {
        let res = self.sdf_resolution as u64;
        res * res * res
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Size of the decode pool. 0 lets rayon pick.
    pub worker_threads: usize,
}
