//! Grid file decoder.
//!
//! Reads the header, optional file metadata and every grid in the file.
//! Each grid's tree is stored root child by root child; internal nodes carry
//! a 4096-bit child mask and leaves a 512-bit value mask followed by one
//! density word per set bit.

use crate::core::BitKeys;
use crate::error::DecodeError;

use super::reader::ByteReader;
use super::{InternalNode, LeafNode, RootNode, SparseGrid, Voxel};

pub const FILE_MAGIC: i64 = 0x5644_4220;
pub const MIN_FILE_VERSION: u32 = 222;
pub(crate) const UUID_LEN: usize = 36;
pub(crate) const CHILD_MASK_WORDS: usize = 64;
pub(crate) const VALUE_MASK_WORDS: usize = 8;

/// Parses every grid in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Vec<SparseGrid>, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let grid_count = read_header(&mut reader)?;
    let mut grids = Vec::with_capacity(grid_count);
    for _ in 0..grid_count {
        grids.push(read_grid(&mut reader)?);
    }
    Ok(grids)
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<usize, DecodeError> {
    let magic = reader.i64()?;
    if magic != FILE_MAGIC {
        return Err(DecodeError::BadHeader(format!(
            "magic {magic:#x} != {FILE_MAGIC:#x}"
        )));
    }
    let version = reader.u32()?;
    if version < MIN_FILE_VERSION {
        return Err(DecodeError::BadHeader(format!(
            "file version {version} older than {MIN_FILE_VERSION}"
        )));
    }
    let _library_major = reader.u32()?;
    let _library_minor = reader.u32()?;
    let _has_offsets = reader.u8()?;
    let uuid = reader.bytes(UUID_LEN)?;
    if !uuid.is_ascii() {
        return Err(DecodeError::BadHeader("uuid is not ASCII".into()));
    }

    // name len + type len + value len
    let meta_count = reader.count(12)?;
    for _ in 0..meta_count {
        let _name = reader.string("metadata name")?;
        let _ty = reader.string("metadata type")?;
        let len = reader.u32()? as usize;
        reader.bytes(len)?;
    }

    // name len + type len + size + center count + background + child count
    reader.count(4 + 4 + 12 + 4 + 4 + 4)
}

fn read_grid(reader: &mut ByteReader<'_>) -> Result<SparseGrid, DecodeError> {
    let name = reader.string("grid name")?;
    let grid_type = reader.string("grid type")?;
    let size = reader.coord()?;
    if size.iter().any(|&s| s < 0) {
        return Err(DecodeError::BadHeader(format!(
            "grid '{name}': negative size {size:?}"
        )));
    }

    let center_count = reader.count(12)?;
    let mut centers = Vec::with_capacity(center_count);
    for _ in 0..center_count {
        let coord = reader.coord()?;
        if BitKeys::try_from_coord(coord).is_none() {
            return Err(DecodeError::CoordinateOutOfRange { coord });
        }
        centers.push(coord);
    }

    let mut root = RootNode {
        background: reader.u32()?,
        ..Default::default()
    };
    let child_count = reader.count(12 + CHILD_MASK_WORDS * 8)?;
    for _ in 0..child_count {
        let origin = reader.coord()?;
        let keys = BitKeys::try_from_coord(origin)
            .ok_or(DecodeError::CoordinateOutOfRange { coord: origin })?;
        let node = read_internal(reader)?;
        if !root.try_insert(keys.coarse, node) {
            return Err(DecodeError::DuplicateNode {
                grid: name,
                key: keys.coarse,
            });
        }
    }

    Ok(SparseGrid {
        name,
        grid_type,
        size,
        centers,
        root,
    })
}

fn read_internal(reader: &mut ByteReader<'_>) -> Result<InternalNode, DecodeError> {
    let mut mask = [0u64; CHILD_MASK_WORDS];
    for word in mask.iter_mut() {
        *word = reader.u64()?;
    }
    let mut node = InternalNode::default();
    for mid in set_bits(&mask) {
        node.insert(mid, read_leaf(reader)?);
    }
    Ok(node)
}

fn read_leaf(reader: &mut ByteReader<'_>) -> Result<LeafNode, DecodeError> {
    let mut mask = [0u64; VALUE_MASK_WORDS];
    for word in mask.iter_mut() {
        *word = reader.u64()?;
    }
    let mut leaf = LeafNode::default();
    for fine in set_bits(&mask) {
        leaf.insert(fine, Voxel { density_raw: reader.u32()? });
    }
    Ok(leaf)
}

/// Indices of set bits, ascending.
pub(crate) fn set_bits(mask: &[u64]) -> impl Iterator<Item = u16> + '_ {
    mask.iter().enumerate().flat_map(|(word_index, &word)| {
        let mut bits = word;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let bit = bits.trailing_zeros();
            bits &= bits - 1;
            Some((word_index * 64) as u16 + bit as u16)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decode_density;
    use crate::grid::testkit::{raw_for_density, GridFileBuilder};

    #[test]
    fn set_bits_walks_across_words() {
        let mask = [0b101u64, 0, 1 << 63];
        let bits: Vec<u16> = set_bits(&mask).collect();
        assert_eq!(bits, vec![0, 2, 191]);
    }

    #[test]
    fn decodes_tree_and_centers() {
        let mut builder = GridFileBuilder::new();
        builder
            .grid("density", [64, 32, 16])
            .voxel([1, 2, 3], raw_for_density(0.5))
            .voxel([200, 9, 4000], raw_for_density(2.0))
            .center([7, 7, 7]);
        let grids = decode(&builder.build()).expect("decode");

        assert_eq!(grids.len(), 1);
        let grid = &grids[0];
        assert_eq!(grid.name, "density");
        assert_eq!(grid.size, [64, 32, 16]);
        assert_eq!(grid.centers, vec![[1, 2, 3], [200, 9, 4000], [7, 7, 7]]);
        assert_eq!(grid.voxel_count(), 2);
        assert_eq!(grid.root.len(), 2);

        let voxel = grid.lookup(BitKeys::from_coord([200, 9, 4000])).expect("hit");
        assert!((decode_density(voxel.density_raw) - 2.0).abs() < 1e-3);
        assert!(grid.lookup(BitKeys::from_coord([7, 7, 7])).is_none());
    }

    #[test]
    fn decodes_multiple_grids() {
        let mut builder = GridFileBuilder::new();
        builder.grid("density", [8, 8, 8]).voxel([0, 0, 0], 10);
        builder.grid("temperature", [8, 8, 8]).voxel([1, 0, 0], 20);
        builder.grid("flame", [8, 8, 8]);
        builder.metadata("creator", "string", b"tests");
        let grids = decode(&builder.build()).expect("decode");
        let names: Vec<&str> = grids.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["density", "temperature", "flame"]);
        assert!(grids[2].root.is_empty());
    }

    #[test]
    fn bad_magic_is_bad_header() {
        let mut bytes = GridFileBuilder::new().build();
        bytes[0] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadHeader(_))));
    }

    #[test]
    fn old_version_is_bad_header() {
        let mut builder = GridFileBuilder::new();
        builder.version(MIN_FILE_VERSION - 1);
        assert!(matches!(decode(&builder.build()), Err(DecodeError::BadHeader(_))));
    }

    #[test]
    fn cut_tree_is_truncated() {
        let mut builder = GridFileBuilder::new();
        builder
            .grid("density", [16, 16, 16])
            .voxel([1, 1, 1], 5)
            .voxel([9, 1, 1], 6);
        let bytes = builder.build();
        for cut in [bytes.len() - 1, bytes.len() - 40, bytes.len() / 2] {
            assert!(
                matches!(decode(&bytes[..cut]), Err(DecodeError::Truncated { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn out_of_range_center_is_rejected() {
        let mut builder = GridFileBuilder::new();
        builder.grid("density", [8, 8, 8]).center([0, 4096, 0]);
        assert_eq!(
            decode(&builder.build()).unwrap_err(),
            DecodeError::CoordinateOutOfRange { coord: [0, 4096, 0] }
        );
    }

    #[test]
    fn duplicate_root_child_is_rejected() {
        let mut builder = GridFileBuilder::new();
        builder
            .grid("density", [8, 8, 8])
            .voxel([0, 0, 0], 1)
            .duplicate_first_root_child();
        assert!(matches!(
            decode(&builder.build()),
            Err(DecodeError::DuplicateNode { .. })
        ));
    }
}
