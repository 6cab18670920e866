use std::fs;
use std::path::{Path, PathBuf};

use vdb_volume::grid::testkit::{raw_for_density, GridFileBuilder};
use vdb_volume::{LoadConfig, LoadError, LoadOrchestrator};

struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("vdb_volume-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        Self(dir)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.0.join(name);
        fs::write(&path, bytes).expect("write fixture");
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn fixture(voxels: &[[i32; 3]], size: [i32; 3]) -> Vec<u8> {
    let mut builder = GridFileBuilder::new();
    let grid = builder.grid("density", size);
    for &coord in voxels {
        grid.voxel(coord, raw_for_density(1.0));
    }
    builder.build()
}

fn orchestrator() -> LoadOrchestrator {
    LoadOrchestrator::new(&LoadConfig { worker_threads: 3 }).expect("pool")
}

#[test]
fn corrupt_file_is_excluded_and_order_is_kept() {
    let scratch = Scratch::new("order");
    let first = scratch.write("a.vdb", &fixture(&[[1, 2, 3]], [16, 16, 16]));
    let mut corrupt = fixture(&[[4, 4, 4]], [16, 16, 16]);
    corrupt.truncate(corrupt.len() / 2);
    let broken = scratch.write("b.vdb", &corrupt);
    let second = scratch.write("c.vdb", &fixture(&[[0, 0, 0], [5, 5, 5]], [8, 9, 10]));

    let report = orchestrator().load(&[&first, &broken, &second]);

    let loaded: Vec<&Path> = report.assets.iter().map(|a| a.path.as_path()).collect();
    assert_eq!(loaded, vec![first.as_path(), second.as_path()]);
    assert_eq!(report.assets[0].primary.entries.len(), 1);
    assert_eq!(report.assets[1].primary.entries.len(), 2);
    assert_eq!(report.assets[1].extent, [8, 10, 9]);

    assert_eq!(report.failures.len(), 1);
    let (path, err) = &report.failures[0];
    assert_eq!(path, &broken);
    assert!(matches!(err, LoadError::Decode { .. }));
}

#[test]
fn many_files_load_in_input_order() {
    let scratch = Scratch::new("many");
    let paths: Vec<PathBuf> = (0..12)
        .map(|i| {
            let voxels: Vec<[i32; 3]> = (0..=i).map(|x| [x, 0, 0]).collect();
            scratch.write(&format!("{i}.vdb"), &fixture(&voxels, [32, 32, 32]))
        })
        .collect();

    let report = orchestrator().load(&paths);

    assert!(report.failures.is_empty());
    for (i, asset) in report.assets.iter().enumerate() {
        assert_eq!(asset.path, paths[i]);
        assert_eq!(asset.primary.entries.len(), i + 1);
    }
}

#[test]
fn file_with_bad_magic_reports_header_error() {
    let scratch = Scratch::new("magic");
    let mut bytes = fixture(&[[1, 1, 1]], [4, 4, 4]);
    bytes[0] ^= 0xff;
    let path = scratch.write("bad.vdb", &bytes);

    let report = orchestrator().load(&[path]);

    assert!(report.assets.is_empty());
    assert!(matches!(
        report.failures[0].1,
        LoadError::Decode {
            source: vdb_volume::DecodeError::BadHeader(_),
            ..
        }
    ));
}
