//! Headless driver: loads grid files and renders a fixed number of frames.
//!
//! ```text
//! vdb_frames [--frames N] [--config render.json] [--threads N] [--no-mesh] FILE...
//! ```
//!
//! Set `RUST_LOG=debug` to see per-frame plans.

use std::error::Error;
use std::path::PathBuf;

use glam::{Mat4, Vec3};
use log::info;
use vdb_volume::{
    CameraMatrices, LightKind, LoadConfig, LoadOrchestrator, MeshInstance, RenderConfig,
    SceneLight, VolumeRenderer,
};

struct Args {
    frames: u32,
    config: Option<PathBuf>,
    threads: usize,
    with_mesh: bool,
    files: Vec<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        frames: 8,
        config: None,
        threads: 0,
        with_mesh: true,
        files: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--frames" => {
                let value = iter.next().ok_or("--frames needs a value")?;
                args.frames = value.parse().map_err(|e| format!("--frames: {e}"))?;
            }
            "--threads" => {
                let value = iter.next().ok_or("--threads needs a value")?;
                args.threads = value.parse().map_err(|e| format!("--threads: {e}"))?;
            }
            "--config" => {
                args.config = Some(iter.next().ok_or("--config needs a path")?.into());
            }
            "--no-mesh" => args.with_mesh = false,
            _ if arg.starts_with("--") => return Err(format!("unknown option {arg}")),
            _ => args.files.push(arg.into()),
        }
    }
    Ok(args)
}

fn unit_cube(position: Vec3) -> MeshInstance {
    let vertices = (0..8)
        .map(|i| Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32))
        .collect();
    let indices = vec![
        0, 1, 3, 0, 3, 2, 4, 6, 7, 4, 7, 5, 0, 4, 5, 0, 5, 1, 2, 3, 7, 2, 7, 6, 0, 2, 6, 0, 6, 4, 1,
        5, 7, 1, 7, 3,
    ];
    MeshInstance::new(vertices, indices, position, Vec3::splat(16.0))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => RenderConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => RenderConfig::default(),
    };

    let orchestrator = LoadOrchestrator::new(&LoadConfig {
        worker_threads: args.threads,
    })?;
    let report = orchestrator.load(&args.files);
    info!(
        "{} assets loaded, {} skipped",
        report.assets.len(),
        report.failures.len()
    );

    let mut meshes = if args.with_mesh {
        vec![unit_cube(Vec3::new(8.0, 0.0, 8.0))]
    } else {
        Vec::new()
    };
    let lights = vec![SceneLight {
        position: Vec3::ZERO,
        direction: Vec3::new(-0.3, -1.0, -0.2).normalize(),
        color: Vec3::ONE,
        intensity: 1.0,
        kind: LightKind::Directional,
    }];
    let [width, height] = config.screen_size;
    let camera = CameraMatrices {
        inverse_projection: Mat4::perspective_rh(
            60f32.to_radians(),
            width as f32 / height as f32,
            0.1,
            1000.0,
        )
        .inverse(),
        camera_to_world: Mat4::look_at_rh(Vec3::new(-64.0, 48.0, -64.0), Vec3::splat(32.0), Vec3::Y)
            .inverse(),
    };

    let mut renderer = pollster::block_on(VolumeRenderer::new(
        config,
        &report.assets,
        &meshes,
        &lights,
    ))?;

    for frame in 0..args.frames {
        // Move the mesh halfway through to exercise the SDF rebuild.
        if frame == args.frames / 2 {
            if let Some(mesh) = meshes.first_mut() {
                mesh.set_transform(mesh.position() + Vec3::X * 4.0, mesh.scale());
            }
        }
        let stats = pollster::block_on(renderer.render_frame(&mut meshes, &lights, &camera))?;
        info!(
            "frame {}: {} dispatches, volume rebuilt {}, history reset {}, sdf sites {}",
            stats.frame, stats.dispatches, stats.volume_rebuilt, stats.history_reset, stats.sdf_sites
        );
    }
    Ok(())
}
