//! Three-level sparse grid (Root 32³ → Internal 16³ → Leaf 8³).
//!
//! Each level is a map owned by value by its parent, keyed by the bit keys
//! from [`BitKeys`]. A decoded grid is consumed by the extractor and then
//! dropped; only the flat entry lists outlive it.

use std::collections::HashMap;

use crate::core::BitKeys;

pub mod decode;
mod reader;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use decode::{decode, FILE_MAGIC, MIN_FILE_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voxel {
    pub density_raw: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LeafNode {
    voxels: HashMap<u16, Voxel>,
}

impl LeafNode {
    pub fn insert(&mut self, fine: u16, voxel: Voxel) {
        self.voxels.insert(fine, voxel);
    }

    pub fn get(&self, fine: u16) -> Option<&Voxel> {
        self.voxels.get(&fine)
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InternalNode {
    leaves: HashMap<u16, LeafNode>,
}

impl InternalNode {
    pub fn insert(&mut self, mid: u16, leaf: LeafNode) {
        self.leaves.insert(mid, leaf);
    }

    pub fn get(&self, mid: u16) -> Option<&LeafNode> {
        self.leaves.get(&mid)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &LeafNode> {
        self.leaves.values()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RootNode {
    /// Raw background value; not consulted by extraction.
    pub background: u32,
    children: HashMap<u16, InternalNode>,
}

impl RootNode {
    /// Inserts a child, returning `false` if the key was already present.
    pub fn try_insert(&mut self, coarse: u16, node: InternalNode) -> bool {
        use std::collections::hash_map::Entry;
        match self.children.entry(coarse) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    pub fn get(&self, coarse: u16) -> Option<&InternalNode> {
        self.children.get(&coarse)
    }

    pub fn children(&self) -> impl Iterator<Item = &InternalNode> {
        self.children.values()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// One decoded grid.
#[derive(Debug, Clone, Default)]
pub struct SparseGrid {
    pub name: String,
    pub grid_type: String,
    pub size: [i32; 3],
    /// Candidate voxel coordinates, in file order.
    pub centers: Vec<[i32; 3]>,
    pub root: RootNode,
}

impl SparseGrid {
    /// Three-level lookup. `None` at any level means empty space.
    pub fn lookup(&self, keys: BitKeys) -> Option<&Voxel> {
        self.root.get(keys.coarse)?.get(keys.mid)?.get(keys.fine)
    }

    pub fn voxel_count(&self) -> usize {
        self.root
            .children()
            .flat_map(|node| node.leaves())
            .map(LeafNode::len)
            .sum()
    }
}
