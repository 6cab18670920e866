//! Flattens a decoded grid into a sparse voxel list.

use crate::core::{
    decode_density, passes_threshold, BitKeys, ExtractedGrid, SparseVoxelEntry,
};
use crate::grid::SparseGrid;

/// Walks `grid.centers` in order and emits every center that resolves to a
/// stored voxel with density above the threshold, stopping at `max_entries`.
///
/// A miss at any tree level is empty space, not an error.
pub fn extract(grid: &SparseGrid, max_entries: usize) -> Vec<SparseVoxelEntry> {
    let mut entries = Vec::with_capacity(grid.centers.len().min(max_entries));
    for &center in &grid.centers {
        if entries.len() >= max_entries {
            break;
        }
        let Some(voxel) = grid.lookup(BitKeys::from_coord(center)) else {
            continue;
        };
        let density = decode_density(voxel.density_raw);
        if passes_threshold(density) {
            entries.push(SparseVoxelEntry::from_center(center, density));
        }
    }
    entries
}

/// [`extract`] over every center, paired with the consumer-order extent.
pub fn extract_grid(grid: &SparseGrid) -> ExtractedGrid {
    let [sx, sy, sz] = grid.size;
    ExtractedGrid {
        extent: [sx.max(0) as u32, sz.max(0) as u32, sy.max(0) as u32],
        entries: extract(grid, grid.centers.len()),
    }
}
