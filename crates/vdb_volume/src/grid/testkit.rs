//! Writer for grid files in the layout [`decode`](super::decode) reads.
//! Used to build fixtures; not a general encoder.

use std::collections::BTreeMap;

use crate::core::{BitKeys, DENSITY_SCALE_HI, DENSITY_SCALE_LO};

use super::decode::{CHILD_MASK_WORDS, FILE_MAGIC, MIN_FILE_VERSION, UUID_LEN, VALUE_MASK_WORDS};

/// Inverse of [`decode_density`](crate::core::decode_density), up to denormal precision.
pub fn raw_for_density(density: f32) -> u32 {
    (density / DENSITY_SCALE_LO / DENSITY_SCALE_HI).to_bits()
}

#[derive(Debug, Clone)]
pub struct GridBuilder {
    name: String,
    grid_type: String,
    size: [i32; 3],
    centers: Vec<[i32; 3]>,
    voxels: Vec<([i32; 3], u32)>,
    duplicate_first_root_child: bool,
}

impl GridBuilder {
    /// Adds a stored voxel and lists its coordinate as a center.
    pub fn voxel(&mut self, coord: [i32; 3], raw: u32) -> &mut Self {
        self.voxels.push((coord, raw));
        self.centers.push(coord);
        self
    }

    /// Adds a stored voxel that is not listed as a center.
    pub fn hidden_voxel(&mut self, coord: [i32; 3], raw: u32) -> &mut Self {
        self.voxels.push((coord, raw));
        self
    }

    /// Lists a center with no stored voxel behind it.
    pub fn center(&mut self, coord: [i32; 3]) -> &mut Self {
        self.centers.push(coord);
        self
    }

    pub fn duplicate_first_root_child(&mut self) -> &mut Self {
        self.duplicate_first_root_child = true;
        self
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_str(out, &self.name);
        write_str(out, &self.grid_type);
        for s in self.size {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out.extend_from_slice(&(self.centers.len() as u32).to_le_bytes());
        for c in &self.centers {
            for v in c {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());

        // coarse -> (origin, mid -> fine -> raw)
        let mut tree: BTreeMap<u16, ([i32; 3], BTreeMap<u16, BTreeMap<u16, u32>>)> =
            BTreeMap::new();
        for &(coord, raw) in &self.voxels {
            let keys = BitKeys::from_coord(coord);
            let (_, internal) = tree.entry(keys.coarse).or_insert((coord, BTreeMap::new()));
            internal.entry(keys.mid).or_default().insert(keys.fine, raw);
        }

        let mut children: Vec<Vec<u8>> = tree
            .values()
            .map(|(origin, internal)| write_internal(*origin, internal))
            .collect();
        if self.duplicate_first_root_child {
            if let Some(first) = children.first().cloned() {
                children.push(first);
            }
        }
        out.extend_from_slice(&(children.len() as u32).to_le_bytes());
        for child in children {
            out.extend_from_slice(&child);
        }
    }
}

fn write_internal(origin: [i32; 3], internal: &BTreeMap<u16, BTreeMap<u16, u32>>) -> Vec<u8> {
    let mut out = Vec::new();
    for v in origin {
        out.extend_from_slice(&v.to_le_bytes());
    }
    let mut child_mask = [0u64; CHILD_MASK_WORDS];
    for &mid in internal.keys() {
        child_mask[mid as usize / 64] |= 1u64 << (mid % 64);
    }
    for word in child_mask {
        out.extend_from_slice(&word.to_le_bytes());
    }
    // BTreeMap iteration is ascending, matching mask order.
    for leaf in internal.values() {
        let mut value_mask = [0u64; VALUE_MASK_WORDS];
        for &fine in leaf.keys() {
            value_mask[fine as usize / 64] |= 1u64 << (fine % 64);
        }
        for word in value_mask {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for raw in leaf.values() {
            out.extend_from_slice(&raw.to_le_bytes());
        }
    }
    out
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[derive(Debug, Clone)]
pub struct GridFileBuilder {
    version: u32,
    metadata: Vec<(String, String, Vec<u8>)>,
    grids: Vec<GridBuilder>,
}

impl Default for GridFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GridFileBuilder {
    pub fn new() -> Self {
        Self {
            version: MIN_FILE_VERSION,
            metadata: Vec::new(),
            grids: Vec::new(),
        }
    }

    pub fn version(&mut self, version: u32) -> &mut Self {
        self.version = version;
        self
    }

    pub fn metadata(&mut self, name: &str, ty: &str, value: &[u8]) -> &mut Self {
        self.metadata.push((name.into(), ty.into(), value.to_vec()));
        self
    }

    /// Starts a new float grid and returns it for population.
    pub fn grid(&mut self, name: &str, size: [i32; 3]) -> &mut GridBuilder {
        self.grids.push(GridBuilder {
            name: name.into(),
            grid_type: "Tree_float_5_4_3".into(),
            size,
            centers: Vec::new(),
            voxels: Vec::new(),
            duplicate_first_root_child: false,
        });
        let last = self.grids.len() - 1;
        &mut self.grids[last]
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&10u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(0);
        let uuid = "00000000-0000-0000-0000-000000000000";
        debug_assert_eq!(uuid.len(), UUID_LEN);
        out.extend_from_slice(uuid.as_bytes());

        out.extend_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        for (name, ty, value) in &self.metadata {
            write_str(&mut out, name);
            write_str(&mut out, ty);
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        }

        out.extend_from_slice(&(self.grids.len() as u32).to_le_bytes());
        for grid in &self.grids {
            grid.write(&mut out);
        }
        out
    }
}
