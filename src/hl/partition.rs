//! Placement calculation: which block of a global shape each participant owns.
//!
//! All functions here are pure; every participant calls them independently with the same
//! global parameters and arrives at a consistent, non-overlapping decomposition without
//! any communication.

use serde::{Deserialize, Serialize};

use crate::hl::rank::RankInfo;
use crate::internal_prelude::*;

/// Splits `len` elements into `count` contiguous near-equal runs and returns `(offset, size)`
/// of run `index`: every run gets `len / count` elements and the first `len % count` runs
/// one extra.
fn balanced_run(len: Ix, index: usize, count: usize) -> (Ix, Ix) {
    let (base, extra) = (len / count, len % count);
    let offset = index * base + index.min(extra);
    let size = base + usize::from(index < extra);
    (offset, size)
}

/// Computes the block of participant `rank` when `shape[axis]` is split into `rank_count`
/// contiguous near-equal blocks; all other axes are taken in full.
///
/// Fails with `InvalidPartition` if `rank_count` is zero, `rank` is not below `rank_count`,
/// `axis` is not an axis of `shape`, or there are more participants than elements along
/// `axis` (use [`explicit_block`] for empty contributions).
pub fn compute_block(
    shape: &Shape, rank: usize, rank_count: usize, axis: usize,
) -> Result<Placement> {
    if rank_count == 0 {
        bad_partition!("rank count must be positive");
    }
    if rank >= rank_count {
        bad_partition!("rank index {} is outside [0, {})", rank, rank_count);
    }
    let len = match shape.axis(axis) {
        Some(len) => len,
        None => bad_partition!("axis {} is out of range for shape {}", axis, shape),
    };
    if rank_count > len {
        bad_partition!(
            "cannot split {} elements along axis {} among {} participants",
            len,
            axis,
            rank_count
        );
    }
    let (start, size) = balanced_run(len, rank, rank_count);
    let mut offset = vec![0; shape.ndim()];
    let mut extent = shape.dims();
    offset[axis] = start;
    extent[axis] = size;
    Placement::new(offset, extent)
}

/// Blocks of all participants for [`compute_block`], in rank order.
pub fn compute_blocks(shape: &Shape, rank_count: usize, axis: usize) -> Result<Vec<Placement>> {
    if rank_count == 0 {
        bad_partition!("rank count must be positive");
    }
    (0..rank_count).map(|rank| compute_block(shape, rank, rank_count, axis)).collect()
}

/// Accepts a caller-supplied block, checking only its dimension count and that it lies
/// within `shape`. Zero extents are allowed and denote an empty contribution.
pub fn explicit_block<O: Dimension, E: Dimension>(
    shape: &Shape, offset: O, extent: E,
) -> Result<Placement> {
    let (offset, extent) = (offset.dims(), extent.dims());
    if offset.len() != shape.ndim() || extent.len() != shape.ndim() {
        bad_partition!(
            "block ndim ({}, {}) != shape ndim ({})",
            offset.len(),
            extent.len(),
            shape.ndim()
        );
    }
    for axis in 0..shape.ndim() {
        if offset[axis].checked_add(extent[axis]).map_or(true, |end| end > shape[axis]) {
            bad_partition!(
                "block {}+{} exceeds size {} along axis {}",
                offset[axis],
                extent[axis],
                shape[axis],
                axis
            );
        }
    }
    Placement::new(offset, extent)
}

/// Tiles `shape` with a regular grid of `chunk`-shaped blocks in row-major order.
/// Chunks on the upper edge of an axis are truncated to the shape.
pub fn chunk_grid<C: Dimension>(shape: &Shape, chunk: C) -> Result<Vec<Placement>> {
    let chunk = chunk.dims();
    if chunk.len() != shape.ndim() {
        bad_partition!("chunk ndim ({}) != shape ndim ({})", chunk.len(), shape.ndim());
    }
    if let Some(axis) = chunk.iter().position(|&c| c == 0) {
        bad_partition!("chunk size along axis {} must be positive", axis);
    }
    let counts: Vec<usize> =
        shape.iter().zip(&chunk).map(|(&s, &c)| s / c + usize::from(s % c != 0)).collect();
    let total: usize = counts.iter().product();

    let mut grid = Vec::with_capacity(total);
    let mut cursor = vec![0; shape.ndim()];
    for _ in 0..total {
        let offset: Vec<Ix> = cursor.iter().zip(&chunk).map(|(&k, &c)| k * c).collect();
        let extent: Vec<Ix> = offset
            .iter()
            .zip(&chunk)
            .zip(shape.iter())
            .map(|((&o, &c), &s)| c.min(s - o))
            .collect();
        grid.push(Placement::new(offset, extent)?);
        for axis in (0..shape.ndim()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < counts[axis] {
                break;
            }
            cursor[axis] = 0;
        }
    }
    Ok(grid)
}

/// Hands participant `rank` a contiguous, balanced run of `chunks`. With more participants
/// than chunks, the trailing participants receive nothing.
pub fn distribute_chunks(
    chunks: &[Placement], rank: usize, rank_count: usize,
) -> Result<Vec<Placement>> {
    if rank_count == 0 {
        bad_partition!("rank count must be positive");
    }
    if rank >= rank_count {
        bad_partition!("rank index {} is outside [0, {})", rank, rank_count);
    }
    let (start, size) = balanced_run(chunks.len(), rank, rank_count);
    Ok(chunks[start..start + size].to_vec())
}

/// How a dataset is decomposed among participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Partition {
    /// Contiguous near-equal blocks along one axis (see [`compute_block`]).
    Block { axis: usize },
    /// A caller-supplied block, identical to what [`explicit_block`] accepts.
    Explicit(Placement),
    /// A regular chunk grid, chunks handed out with [`distribute_chunks`].
    Chunks { chunk: Vec<Ix> },
}

impl Partition {
    /// Splits along `axis` (see [`compute_block`]).
    pub fn block(axis: usize) -> Self {
        Self::Block { axis }
    }

    pub fn chunks<C: Dimension>(chunk: C) -> Self {
        Self::Chunks { chunk: chunk.dims() }
    }

    /// Placements owned by one participant.
    pub fn placements(&self, shape: &Shape, ranks: RankInfo) -> Result<Vec<Placement>> {
        match self {
            Self::Block { axis } => {
                Ok(vec![compute_block(shape, ranks.rank(), ranks.size(), *axis)?])
            }
            Self::Explicit(p) => Ok(vec![explicit_block(shape, p.offset(), p.extent())?]),
            Self::Chunks { chunk } => {
                distribute_chunks(&chunk_grid(shape, chunk)?, ranks.rank(), ranks.size())
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::hl::tiling::validate;

    fn shape<D: Dimension>(d: D) -> Shape {
        Shape::new(d).unwrap()
    }

    #[test]
    pub fn test_balanced_run() {
        let runs: Vec<_> = (0..4).map(|i| balanced_run(23, i, 4)).collect();
        assert_eq!(runs, vec![(0, 6), (6, 6), (12, 6), (18, 5)]);
        assert_eq!(balanced_run(3, 2, 5), (2, 1));
        assert_eq!(balanced_run(3, 4, 5), (3, 0));
    }

    #[test]
    pub fn test_compute_block_23_by_4() {
        let s = shape([23]);
        let blocks = compute_blocks(&s, 4, 0).unwrap();
        let offsets: Vec<_> = blocks.iter().map(|b| b.offset()[0]).collect();
        let extents: Vec<_> = blocks.iter().map(|b| b.extent()[0]).collect();
        assert_eq!(offsets, vec![0, 6, 12, 18]);
        assert_eq!(extents, vec![6, 6, 6, 5]);
        validate(&s, &blocks).unwrap();
    }

    #[test]
    pub fn test_compute_block_multidim() {
        let s = shape([4, 10, 3]);
        let b = compute_block(&s, 2, 3, 1).unwrap();
        assert_eq!(b.offset(), &[0, 7, 0]);
        assert_eq!(b.extent(), &[4, 3, 3]);
        validate(&s, &compute_blocks(&s, 3, 1).unwrap()).unwrap();
    }

    #[test]
    pub fn test_compute_block_boundaries() {
        let s = shape([7, 2]);
        assert_eq!(compute_block(&s, 0, 1, 0).unwrap(), Placement::full(&s));

        let unit = compute_blocks(&s, 7, 0).unwrap();
        assert!(unit.iter().all(|b| b.extent() == [1, 2]));
        validate(&s, &unit).unwrap();
    }

    #[test]
    pub fn test_compute_block_invalid() {
        let s = shape([3]);
        assert!(compute_block(&s, 0, 5, 0).unwrap_err().is_invalid_partition());
        assert_err!(compute_block(&s, 0, 5, 0), "cannot split 3 elements along axis 0 among 5");
        assert_err!(compute_block(&s, 0, 0, 0), "rank count must be positive");
        assert_err!(compute_block(&s, 3, 3, 0), "rank index 3 is outside [0, 3)");
        assert_err!(compute_block(&s, 0, 1, 1), "axis 1 is out of range for shape (3,)");
        assert_err!(compute_blocks(&s, 0, 0), "rank count must be positive");
    }

    #[test]
    pub fn test_explicit_block() {
        let s = shape([9]);
        let b = explicit_block(&s, [4], [5]).unwrap();
        assert_eq!((b.offset(), b.extent()), (&[4][..], &[5][..]));

        let empty = explicit_block(&s, [9], [0]).unwrap();
        assert!(empty.is_empty());

        assert!(explicit_block(&s, [5], [5]).unwrap_err().is_invalid_partition());
        assert_err!(explicit_block(&s, [5], [5]), "block 5+5 exceeds size 9 along axis 0");
        assert_err!(explicit_block(&s, [0, 0], [1, 1]), "block ndim (2, 2) != shape ndim (1)");
        assert_err!(explicit_block(&s, [usize::MAX], [1]), "exceeds size 9");
    }

    #[test]
    pub fn test_chunk_grid() {
        let s = shape([5, 4]);
        let grid = chunk_grid(&s, [2, 3]).unwrap();
        let repr: Vec<String> = grid.iter().map(ToString::to_string).collect();
        assert_eq!(
            repr,
            vec![
                "[0..2, 0..3]",
                "[0..2, 3..4]",
                "[2..4, 0..3]",
                "[2..4, 3..4]",
                "[4..5, 0..3]",
                "[4..5, 3..4]",
            ]
        );
        validate(&s, &grid).unwrap();

        // a chunk larger than the shape yields the whole shape
        assert_eq!(chunk_grid(&s, [8, 8]).unwrap(), vec![Placement::full(&s)]);

        assert_err!(chunk_grid(&s, [2]), "chunk ndim (1) != shape ndim (2)");
        assert_err!(chunk_grid(&s, [2, 0]), "chunk size along axis 1 must be positive");
    }

    #[test]
    pub fn test_distribute_chunks() {
        let s = shape([6, 6]);
        let grid = chunk_grid(&s, [2, 2]).unwrap();
        assert_eq!(grid.len(), 9);

        let mut all = Vec::new();
        let mut counts = Vec::new();
        for rank in 0..4 {
            let mine = distribute_chunks(&grid, rank, 4).unwrap();
            counts.push(mine.len());
            all.extend(mine);
        }
        assert_eq!(counts, vec![3, 2, 2, 2]);
        assert_eq!(all, grid);
        validate(&s, &all).unwrap();

        // more participants than chunks
        assert!(distribute_chunks(&grid[..2], 3, 4).unwrap().is_empty());
        assert_err!(distribute_chunks(&grid, 4, 4), "rank index 4 is outside [0, 4)");
    }

    #[test]
    pub fn test_partition() {
        let s = shape([10, 4]);
        let ranks = RankInfo::new(1, 2).unwrap();

        let p = Partition::block(0).placements(&s, ranks).unwrap();
        assert_eq!(p, vec![Placement::new([5, 0], [5, 4]).unwrap()]);

        let explicit = Placement::new([0, 0], [0, 4]).unwrap();
        let p = Partition::Explicit(explicit.clone()).placements(&s, ranks).unwrap();
        assert_eq!(p, vec![explicit]);

        let p = Partition::chunks([4, 4]).placements(&s, ranks).unwrap();
        assert_eq!(p, vec![Placement::new([8, 0], [2, 4]).unwrap()]);

        let bad = Partition::Explicit(Placement::new([8, 0], [4, 4]).unwrap());
        assert!(bad.placements(&s, ranks).unwrap_err().is_invalid_partition());
    }
}
