//! Concurrent decoding of grid files.
//!
//! One rayon task per file. Each task reads, decodes and extracts its own
//! file and returns into its own slot of an index-ordered result vector, so
//! units share no mutable state. A failing or panicking unit is logged and
//! excluded; the remaining files still load.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::config::LoadConfig;
use crate::core::{ExtractedGrid, MAX_GRIDS_PER_ASSET};
use crate::error::LoadError;
use crate::extract::extract_grid;
use crate::grid::{decode, SparseGrid};

/// Flattened grids of one input file.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub path: PathBuf,
    pub primary: ExtractedGrid,
    pub secondary: Option<ExtractedGrid>,
    /// Extent of the last converted grid.
    pub extent: [u32; 3],
}

impl LoadedAsset {
    /// Flattens at most the first two grids; the trees are dropped afterwards.
    pub fn from_grids(path: PathBuf, grids: Vec<SparseGrid>) -> Result<Self, LoadError> {
        let mut converted = grids.iter().take(MAX_GRIDS_PER_ASSET).map(extract_grid);
        let primary = converted.next().ok_or_else(|| LoadError::NoGrids { path: path.clone() })?;
        let secondary = converted.next();
        let extent = secondary.as_ref().unwrap_or(&primary).extent;
        Ok(Self {
            path,
            primary,
            secondary,
            extent,
        })
    }

    pub fn active_voxels(&self) -> usize {
        self.primary.entries.len() + self.secondary.as_ref().map_or(0, |g| g.entries.len())
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub assets: Vec<LoadedAsset>,
    pub failures: Vec<(PathBuf, LoadError)>,
}

pub struct LoadOrchestrator {
    pool: ThreadPool,
}

impl LoadOrchestrator {
    pub fn new(config: &LoadConfig) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("vdb-load-{}", i))
            .build()?;
        Ok(Self { pool })
    }

    /// Loads every path and blocks until all units finish.
    pub fn load<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> LoadReport {
        let slots: Vec<Result<LoadedAsset, LoadError>> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| run_unit(path.as_ref()))
                .collect()
        });

        let mut report = LoadReport::default();
        for (path, slot) in paths.iter().zip(slots) {
            match slot {
                Ok(asset) => {
                    info!(
                        "loaded {}: active voxels {}, inactive voxels {}",
                        asset.path.display(),
                        asset.active_voxels(),
                        asset.primary.inactive_cells()
                    );
                    report.assets.push(asset);
                }
                Err(err) => {
                    warn!("skipping asset: {err}");
                    report.failures.push((path.as_ref().to_path_buf(), err));
                }
            }
        }
        report
    }
}

fn run_unit(path: &Path) -> Result<LoadedAsset, LoadError> {
    catch_unwind(AssertUnwindSafe(|| load_asset(path))).unwrap_or_else(|payload| {
        Err(LoadError::WorkerPanicked {
            path: path.to_path_buf(),
            message: panic_message(payload.as_ref()),
        })
    })
}

/// Reads, decodes and extracts one file on the calling thread.
pub fn load_asset(path: &Path) -> Result<LoadedAsset, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let grids = decode(&bytes).map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    LoadedAsset::from_grids(path.to_path_buf(), grids)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

/// Component-wise maximum extent over all assets.
pub fn max_extent(assets: &[LoadedAsset]) -> [u32; 3] {
    assets.iter().fold([0; 3], |acc, asset| {
        [
            acc[0].max(asset.extent[0]),
            acc[1].max(asset.extent[1]),
            acc[2].max(asset.extent[2]),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::testkit::{raw_for_density, GridFileBuilder};

    fn grids(builder: &GridFileBuilder) -> Vec<SparseGrid> {
        decode(&builder.build()).expect("decode")
    }

    #[test]
    fn keeps_first_two_grids_only() {
        let mut builder = GridFileBuilder::new();
        builder.grid("density", [8, 8, 8]).voxel([1, 1, 1], raw_for_density(1.0));
        builder.grid("temperature", [4, 5, 6]).voxel([2, 2, 2], raw_for_density(1.0));
        builder.grid("flame", [99, 99, 99]).voxel([3, 3, 3], raw_for_density(1.0));

        let asset = LoadedAsset::from_grids("a.vdb".into(), grids(&builder)).expect("asset");
        assert_eq!(asset.primary.entries.len(), 1);
        assert_eq!(asset.secondary.as_ref().map(|g| g.entries.len()), Some(1));
        assert_eq!(asset.extent, [4, 6, 5]);
        assert_eq!(asset.active_voxels(), 2);
    }

    #[test]
    fn single_grid_has_no_secondary() {
        let mut builder = GridFileBuilder::new();
        builder.grid("density", [8, 16, 32]);
        let asset = LoadedAsset::from_grids("a.vdb".into(), grids(&builder)).expect("asset");
        assert!(asset.secondary.is_none());
        assert_eq!(asset.extent, [8, 32, 16]);
    }

    #[test]
    fn file_without_grids_is_rejected() {
        let result = LoadedAsset::from_grids("empty.vdb".into(), Vec::new());
        assert!(matches!(result, Err(LoadError::NoGrids { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let orchestrator = LoadOrchestrator::new(&LoadConfig { worker_threads: 2 }).expect("pool");
        let report = orchestrator.load(&["/definitely/not/here.vdb"]);
        assert!(report.assets.is_empty());
        assert!(matches!(report.failures[0].1, LoadError::Io { .. }));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");
        let payload = catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn max_extent_is_component_wise() {
        let asset = |extent| LoadedAsset {
            path: PathBuf::new(),
            primary: ExtractedGrid::default(),
            secondary: None,
            extent,
        };
        assert_eq!(max_extent(&[asset([4, 1, 9]), asset([2, 8, 3])]), [4, 8, 9]);
        assert_eq!(max_extent(&[]), [0, 0, 0]);
    }
}
