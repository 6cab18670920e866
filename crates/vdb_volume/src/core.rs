use bytemuck::{Pod, Zeroable};

/// Largest coordinate addressable through the three-level key scheme.
pub const MAX_COORD: i32 = 4095;

/// Stored densities are pre-scaled; decoding multiplies by both factors in order.
pub const DENSITY_SCALE_HI: f32 = 1.0e38;
pub const DENSITY_SCALE_LO: f32 = 50.0;

/// Entries at or below this density are treated as empty space.
pub const DENSITY_THRESHOLD: f32 = 0.01;

/// Grids consumed per asset: primary and optional secondary.
pub const MAX_GRIDS_PER_ASSET: usize = 2;

/// Decodes a stored density word into a rescaled density.
pub fn decode_density(raw: u32) -> f32 {
    f32::from_bits(raw) * DENSITY_SCALE_HI * DENSITY_SCALE_LO
}

pub fn passes_threshold(density: f32) -> bool {
    density > DENSITY_THRESHOLD
}

/// Keys addressing one voxel through Root (15 bits), Internal (12 bits)
/// and Leaf (9 bits) levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitKeys {
    pub coarse: u16,
    pub mid: u16,
    pub fine: u16,
}

impl BitKeys {
    /// Derives keys from a coordinate, masking each axis to 12 bits.
    pub fn from_coord(coord: [i32; 3]) -> Self {
        let [x, y, z] = coord;
        let coarse = ((x & 4095) >> 7) | (((y & 4095) >> 7) << 5) | (((z & 4095) >> 7) << 10);
        let mid = ((x & 127) >> 3) | (((y & 127) >> 3) << 4) | (((z & 127) >> 3) << 8);
        let fine = (x & 7) | ((y & 7) << 3) | ((z & 7) << 6);
        Self {
            coarse: coarse as u16,
            mid: mid as u16,
            fine: fine as u16,
        }
    }

    /// Like [`BitKeys::from_coord`] but rejects coordinates outside `0..=4095`.
    pub fn try_from_coord(coord: [i32; 3]) -> Option<Self> {
        if coord.iter().all(|&c| (0..=MAX_COORD).contains(&c)) {
            Some(Self::from_coord(coord))
        } else {
            None
        }
    }

    /// Rebuilds the absolute coordinate addressed by these keys.
    pub fn compose(&self) -> [i32; 3] {
        let coarse = self.coarse as i32;
        let mid = self.mid as i32;
        let fine = self.fine as i32;
        let axis = |shift_coarse: i32, shift_mid: i32, shift_fine: i32| {
            (((coarse >> shift_coarse) & 31) << 7)
                | (((mid >> shift_mid) & 15) << 3)
                | ((fine >> shift_fine) & 7)
        };
        [axis(0, 0, 0), axis(5, 4, 3), axis(10, 8, 6)]
    }
}

/// One surviving voxel, laid out for direct upload (16-byte stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SparseVoxelEntry {
    pub position: [f32; 3],
    pub density: f32,
}

impl SparseVoxelEntry {
    /// Stored centers are `(x, y, z)`; consumers expect `(z, x, y)`.
    pub fn from_center(center: [i32; 3], density: f32) -> Self {
        Self {
            position: [center[2] as f32, center[0] as f32, center[1] as f32],
            density,
        }
    }
}

/// Flattened output of one grid.
#[derive(Debug, Clone, Default)]
pub struct ExtractedGrid {
    pub extent: [u32; 3],
    pub entries: Vec<SparseVoxelEntry>,
}

impl ExtractedGrid {
    pub fn num_cells(&self) -> u64 {
        self.extent[0] as u64 * self.extent[1] as u64 * self.extent[2] as u64
    }

    pub fn inactive_cells(&self) -> u64 {
        self.num_cells().saturating_sub(self.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn keys_round_trip_for_random_coords() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let coord = [
                rng.gen_range(0..=MAX_COORD),
                rng.gen_range(0..=MAX_COORD),
                rng.gen_range(0..=MAX_COORD),
            ];
            let keys = BitKeys::try_from_coord(coord).expect("in range");
            assert_eq!(keys.compose(), coord);
        }
    }

    #[test]
    fn keys_round_trip_at_range_corners() {
        for &c in &[0, 7, 8, 127, 128, 4088, MAX_COORD] {
            let coord = [c, MAX_COORD - c, c / 2];
            assert_eq!(BitKeys::from_coord(coord).compose(), coord);
        }
    }

    #[test]
    fn keys_stay_within_level_widths() {
        let keys = BitKeys::from_coord([MAX_COORD, MAX_COORD, MAX_COORD]);
        assert_eq!(keys.coarse, (1 << 15) - 1);
        assert_eq!(keys.mid, (1 << 12) - 1);
        assert_eq!(keys.fine, (1 << 9) - 1);
    }

    #[test]
    fn distinct_coords_give_distinct_paths() {
        let a = BitKeys::from_coord([1, 2, 3]);
        let b = BitKeys::from_coord([2, 1, 3]);
        let c = BitKeys::from_coord([1, 2, 3 + 128]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.mid, c.mid);
        assert_eq!(a.fine, c.fine);
    }

    #[test]
    fn out_of_range_coords_are_rejected() {
        assert!(BitKeys::try_from_coord([-1, 0, 0]).is_none());
        assert!(BitKeys::try_from_coord([0, 4096, 0]).is_none());
        assert!(BitKeys::try_from_coord([0, 0, i32::MAX]).is_none());
    }

    #[test]
    fn density_rescale_is_monotonic() {
        let raws = [1u32, 2, 1000, 1_000_000, 0x0080_0000, 0x3f80_0000];
        for pair in raws.windows(2) {
            assert!(decode_density(pair[0]) < decode_density(pair[1]));
        }
        assert_eq!(decode_density(0), 0.0);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(!passes_threshold(DENSITY_THRESHOLD));
        let above = f32::from_bits(DENSITY_THRESHOLD.to_bits() + 1);
        assert!(passes_threshold(above));
        assert!(!passes_threshold(0.0));
    }

    #[test]
    fn entry_permutes_center_axes() {
        let entry = SparseVoxelEntry::from_center([1, 2, 3], 0.5);
        assert_eq!(entry.position, [3.0, 1.0, 2.0]);
        assert_eq!(std::mem::size_of::<SparseVoxelEntry>(), 16);
    }
}
