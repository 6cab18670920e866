//! Per-frame stage selection.
//!
//! The scheduler owns the frame counter and decides which compute stages run
//! each frame. It touches no GPU state; [`crate::gpu::VolumeRenderer`]
//! executes the returned [`FramePlan`] stage by stage.
//!
//! ```text
//!            mesh_count == 0 or meshes disabled
//!   ┌──────────┐
//!   │ Disabled │  placeholder SDF bound every frame
//!   └──────────┘
//!
//!   ┌───────────────┐  one mesh   ┌───────────────┐  last mesh  ┌────────┐
//!   │ Voxelizing(0) │────────────▶│ Voxelizing(i) │────────────▶│ Steady │
//!   └───────────────┘  per frame  └───────────────┘  + build    └────────┘
//!           ▲                                                       │
//!           └─────────── mesh transform changed, once built ────────┘
//!                                (reinit, same frame)
//! ```

use glam::Vec3;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdfPhase {
    /// No meshes to voxelize.
    Disabled,
    Voxelizing { mesh_index: usize },
    /// The last mesh is voxelized and the compact SDF is built this frame.
    BuildingSdf,
    Steady,
}

/// Change signals gathered before planning a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub mesh_changed: bool,
    pub light_changed: bool,
    pub bounds_min: Vec3,
}

/// One GPU stage, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SdfReinit,
    Voxelize { mesh_index: usize },
    BuildSdf,
    LightSdf,
    VolumeClear,
    VolumeScatter { secondary: bool },
    VolumePrepass,
    Shade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub frame: u32,
    pub phase: SdfPhase,
    pub active_asset: Option<usize>,
    pub sdf_reinit: bool,
    pub voxelize_mesh: Option<usize>,
    pub build_sdf: bool,
    pub light_sdf: bool,
    pub use_placeholder_sdf: bool,
    pub rebuild_volume: bool,
    pub reset_history: bool,
    pub upload_lights: bool,
    pub bounds_min: Vec3,
}

impl FramePlan {
    /// Stages in the order their read-after-write dependencies require.
    /// `has_secondary` is whether the active asset has a second grid.
    pub fn stages(&self, has_secondary: bool) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(8);
        if self.sdf_reinit {
            stages.push(Stage::SdfReinit);
        }
        if let Some(mesh_index) = self.voxelize_mesh {
            stages.push(Stage::Voxelize { mesh_index });
        }
        if self.build_sdf {
            stages.push(Stage::BuildSdf);
        }
        if self.light_sdf {
            stages.push(Stage::LightSdf);
        }
        if self.rebuild_volume {
            stages.push(Stage::VolumeClear);
            stages.push(Stage::VolumeScatter { secondary: false });
            if has_secondary {
                stages.push(Stage::VolumeScatter { secondary: true });
            }
        }
        if self.active_asset.is_some() {
            stages.push(Stage::VolumePrepass);
        }
        stages.push(Stage::Shade);
        stages
    }
}

#[derive(Debug, Clone)]
pub struct PipelineScheduler {
    frame: u32,
    mesh_count: usize,
    asset_count: usize,
    phase: SdfPhase,
    pending_reset: Option<usize>,
    bounds_min: Vec3,
    /// Set once the first SDF build has been planned.
    built_once: bool,
    /// Set once the frame counter has wrapped past `u32::MAX`.
    wrapped: bool,
}

impl PipelineScheduler {
    /// `voxelize_meshes == false` behaves as if there were no meshes.
    pub fn new(mesh_count: usize, asset_count: usize, voxelize_meshes: bool) -> Self {
        let mesh_count = if voxelize_meshes { mesh_count } else { 0 };
        let phase = if mesh_count == 0 {
            SdfPhase::Disabled
        } else {
            SdfPhase::Voxelizing { mesh_index: 0 }
        };
        Self {
            frame: 0,
            mesh_count,
            asset_count,
            phase,
            pending_reset: None,
            bounds_min: Vec3::ZERO,
            built_once: false,
            wrapped: false,
        }
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_count
    }

    pub fn asset_count(&self) -> usize {
        self.asset_count
    }

    /// Phase the next frame starts in.
    pub fn phase(&self) -> SdfPhase {
        self.phase
    }

    pub fn pending_reset(&self) -> Option<usize> {
        self.pending_reset
    }

    pub fn bounds_min(&self) -> Vec3 {
        self.bounds_min
    }

    /// Decides this frame's stages and advances the frame counter.
    pub fn plan_frame(&mut self, input: FrameInput) -> FramePlan {
        let frame = self.frame;
        self.bounds_min = input.bounds_min;

        let active_asset = match self.asset_count {
            0 => None,
            n => Some(frame as usize % n),
        };
        let has_changed = self.pending_reset.is_some() || input.mesh_changed || input.light_changed;

        // Before the first build there is nothing to reinitialize. After it,
        // a change restarts voxelization even mid-pass.
        let sdf_reinit = input.mesh_changed && self.built_once;
        if sdf_reinit {
            self.phase = SdfPhase::Voxelizing { mesh_index: 0 };
        }

        let (phase, voxelize_mesh, build_sdf) = match self.phase {
            SdfPhase::Voxelizing { mesh_index } if mesh_index + 1 >= self.mesh_count => {
                self.phase = SdfPhase::Steady;
                self.built_once = true;
                (SdfPhase::BuildingSdf, Some(mesh_index), true)
            }
            SdfPhase::Voxelizing { mesh_index } => {
                self.phase = SdfPhase::Voxelizing {
                    mesh_index: mesh_index + 1,
                };
                (SdfPhase::Voxelizing { mesh_index }, Some(mesh_index), false)
            }
            other => (other, None, false),
        };
        let light_sdf = phase == SdfPhase::Steady;

        let cold_start = !self.wrapped && frame < 2;
        let rebuild_volume =
            active_asset.is_some() && (self.asset_count > 1 || cold_start || has_changed);

        match self.pending_reset {
            Some(pending) => {
                if Some(pending) == active_asset {
                    self.pending_reset = None;
                }
            }
            None => {
                if has_changed {
                    self.pending_reset = active_asset;
                }
            }
        }

        let plan = FramePlan {
            frame,
            phase,
            active_asset,
            sdf_reinit,
            voxelize_mesh,
            build_sdf,
            light_sdf,
            use_placeholder_sdf: phase == SdfPhase::Disabled,
            rebuild_volume,
            reset_history: has_changed,
            upload_lights: has_changed,
            bounds_min: input.bounds_min,
        };
        debug!("frame {frame}: {plan:?}");
        let (next, wrapped) = self.frame.overflowing_add(1);
        self.frame = next;
        self.wrapped |= wrapped;
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> FrameInput {
        FrameInput::default()
    }

    fn mesh_moved() -> FrameInput {
        FrameInput {
            mesh_changed: true,
            ..Default::default()
        }
    }

    fn light_moved() -> FrameInput {
        FrameInput {
            light_changed: true,
            ..Default::default()
        }
    }

    #[test]
    fn three_meshes_voxelize_one_per_frame_then_build_once() {
        let mut scheduler = PipelineScheduler::new(3, 1, true);
        let plans: Vec<FramePlan> = (0..8).map(|_| scheduler.plan_frame(quiet())).collect();

        for (frame, plan) in plans.iter().enumerate().take(3) {
            assert_eq!(plan.voxelize_mesh, Some(frame));
            assert!(!plan.light_sdf);
        }
        assert!(!plans[0].build_sdf);
        assert!(!plans[1].build_sdf);
        assert!(plans[2].build_sdf);
        assert_eq!(plans[2].phase, SdfPhase::BuildingSdf);
        for plan in &plans[3..] {
            assert_eq!(plan.voxelize_mesh, None);
            assert!(!plan.build_sdf);
            assert!(!plan.sdf_reinit);
            assert!(plan.light_sdf);
            assert_eq!(plan.phase, SdfPhase::Steady);
        }
        assert_eq!(plans.iter().filter(|p| p.build_sdf).count(), 1);
    }

    #[test]
    fn single_mesh_voxelizes_and_builds_on_frame_zero() {
        let mut scheduler = PipelineScheduler::new(1, 1, true);
        let plan = scheduler.plan_frame(quiet());
        assert_eq!(plan.voxelize_mesh, Some(0));
        assert!(plan.build_sdf);
        assert!(scheduler.plan_frame(quiet()).light_sdf);
    }

    #[test]
    fn mesh_change_in_steady_state_reinitializes_and_revoxelizes() {
        let mut scheduler = PipelineScheduler::new(2, 1, true);
        for _ in 0..4 {
            scheduler.plan_frame(quiet());
        }

        let plan = scheduler.plan_frame(mesh_moved());
        assert!(plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(0));
        assert!(!plan.light_sdf);

        let plan = scheduler.plan_frame(quiet());
        assert!(!plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(1));
        assert!(plan.build_sdf);

        let plan = scheduler.plan_frame(quiet());
        assert_eq!(plan.voxelize_mesh, None);
        assert!(plan.light_sdf);
    }

    #[test]
    fn mesh_change_during_rebuild_reinitializes_again() {
        let mut scheduler = PipelineScheduler::new(2, 1, true);
        for _ in 0..4 {
            scheduler.plan_frame(quiet());
        }

        let plan = scheduler.plan_frame(mesh_moved());
        assert!(plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(0));

        // mesh 0 was voxelized at its old placement; start over
        let plan = scheduler.plan_frame(mesh_moved());
        assert!(plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(0));
        assert!(!plan.build_sdf);

        let plan = scheduler.plan_frame(quiet());
        assert!(!plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(1));
        assert!(plan.build_sdf);
        assert!(scheduler.plan_frame(quiet()).light_sdf);
    }

    #[test]
    fn mesh_change_during_first_pass_does_not_reinit() {
        let mut scheduler = PipelineScheduler::new(3, 1, true);
        scheduler.plan_frame(quiet());
        let plan = scheduler.plan_frame(mesh_moved());
        assert!(!plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, Some(1));
        assert!(plan.reset_history);
    }

    #[test]
    fn light_change_never_reinitializes_sdf() {
        let mut scheduler = PipelineScheduler::new(1, 1, true);
        scheduler.plan_frame(quiet());
        let plan = scheduler.plan_frame(light_moved());
        assert!(!plan.sdf_reinit);
        assert_eq!(plan.voxelize_mesh, None);
        assert!(plan.upload_lights);
    }

    #[test]
    fn no_meshes_binds_placeholder() {
        let mut scheduler = PipelineScheduler::new(0, 1, true);
        for _ in 0..3 {
            let plan = scheduler.plan_frame(mesh_moved());
            assert!(plan.use_placeholder_sdf);
            assert_eq!(plan.phase, SdfPhase::Disabled);
            assert!(!plan.sdf_reinit && !plan.build_sdf && !plan.light_sdf);
            assert_eq!(plan.voxelize_mesh, None);
        }
    }

    #[test]
    fn disabled_voxelization_ignores_meshes() {
        let mut scheduler = PipelineScheduler::new(4, 1, false);
        assert_eq!(scheduler.mesh_count(), 0);
        assert!(scheduler.plan_frame(quiet()).use_placeholder_sdf);
    }

    #[test]
    fn history_latch_covers_both_assets_once() {
        let mut scheduler = PipelineScheduler::new(0, 2, true);
        // frames 0 and 1 quiet
        assert!(!scheduler.plan_frame(quiet()).reset_history);
        assert!(!scheduler.plan_frame(quiet()).reset_history);

        // frame 2, asset 0 active, change observed
        let plan = scheduler.plan_frame(light_moved());
        assert_eq!(plan.active_asset, Some(0));
        assert!(plan.reset_history);
        assert_eq!(scheduler.pending_reset(), Some(0));

        let plan = scheduler.plan_frame(quiet());
        assert_eq!(plan.active_asset, Some(1));
        assert!(plan.reset_history);

        let plan = scheduler.plan_frame(quiet());
        assert_eq!(plan.active_asset, Some(0));
        assert!(plan.reset_history);
        assert_eq!(scheduler.pending_reset(), None);

        for _ in 0..4 {
            assert!(!scheduler.plan_frame(quiet()).reset_history);
        }
    }

    #[test]
    fn second_change_while_latched_keeps_one_pending_index() {
        let mut scheduler = PipelineScheduler::new(0, 3, true);
        scheduler.plan_frame(light_moved()); // asset 0, latch 0
        scheduler.plan_frame(light_moved()); // asset 1
        assert_eq!(scheduler.pending_reset(), Some(0));
        scheduler.plan_frame(quiet()); // asset 2
        let plan = scheduler.plan_frame(quiet()); // asset 0 clears
        assert!(plan.reset_history);
        assert_eq!(scheduler.pending_reset(), None);
        assert!(!scheduler.plan_frame(quiet()).reset_history);
    }

    #[test]
    fn volume_rebuild_conditions_are_independent() {
        // cold start
        let mut single = PipelineScheduler::new(0, 1, true);
        assert!(single.plan_frame(quiet()).rebuild_volume);
        assert!(single.plan_frame(quiet()).rebuild_volume);
        // all three conditions false
        assert!(!single.plan_frame(quiet()).rebuild_volume);
        // change alone
        assert!(single.plan_frame(light_moved()).rebuild_volume);

        // multiple assets alone
        let mut multi = PipelineScheduler::new(0, 2, true);
        for _ in 0..5 {
            assert!(multi.plan_frame(quiet()).rebuild_volume);
        }
    }

    #[test]
    fn quiet_single_asset_skips_scatter() {
        let mut scheduler = PipelineScheduler::new(0, 1, true);
        scheduler.plan_frame(quiet());
        scheduler.plan_frame(quiet());
        let stages = scheduler.plan_frame(quiet()).stages(true);
        assert!(!stages.iter().any(|s| matches!(s, Stage::VolumeScatter { .. })));
        assert_eq!(stages, vec![Stage::VolumePrepass, Stage::Shade]);
    }

    #[test]
    fn frame_counter_wraps_without_a_second_cold_start() {
        let mut scheduler = PipelineScheduler::new(0, 1, true);
        scheduler.frame = u32::MAX - 1;
        assert!(!scheduler.plan_frame(quiet()).rebuild_volume);
        assert!(!scheduler.plan_frame(quiet()).rebuild_volume);
        assert_eq!(scheduler.frame(), 0);
        let plans: Vec<FramePlan> = (0..2).map(|_| scheduler.plan_frame(quiet())).collect();
        assert_eq!(plans[0].frame, 0);
        assert!(plans.iter().all(|p| !p.rebuild_volume));
        assert!(scheduler.plan_frame(light_moved()).rebuild_volume);
    }

    #[test]
    fn no_assets_still_shades() {
        let mut scheduler = PipelineScheduler::new(0, 0, true);
        let plan = scheduler.plan_frame(light_moved());
        assert_eq!(plan.active_asset, None);
        assert!(!plan.rebuild_volume);
        assert_eq!(plan.stages(false), vec![Stage::Shade]);
    }

    #[test]
    fn round_robin_active_asset() {
        let mut scheduler = PipelineScheduler::new(0, 3, true);
        let active: Vec<Option<usize>> =
            (0..6).map(|_| scheduler.plan_frame(quiet()).active_asset).collect();
        assert_eq!(active, vec![Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn stages_follow_dependency_order() {
        let mut scheduler = PipelineScheduler::new(1, 1, true);
        scheduler.plan_frame(quiet());
        let plan = scheduler.plan_frame(mesh_moved());
        assert_eq!(
            plan.stages(true),
            vec![
                Stage::SdfReinit,
                Stage::Voxelize { mesh_index: 0 },
                Stage::BuildSdf,
                Stage::VolumeClear,
                Stage::VolumeScatter { secondary: false },
                Stage::VolumeScatter { secondary: true },
                Stage::VolumePrepass,
                Stage::Shade,
            ]
        );
    }

    #[test]
    fn bounds_are_recorded_per_frame() {
        let mut scheduler = PipelineScheduler::new(1, 1, true);
        let input = FrameInput {
            bounds_min: Vec3::new(-4.0, 0.5, 2.0),
            ..Default::default()
        };
        assert_eq!(scheduler.plan_frame(input).bounds_min, input.bounds_min);
        assert_eq!(scheduler.bounds_min(), input.bounds_min);
    }
}
