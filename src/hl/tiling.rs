//! Checks that a set of placements partitions a shape exactly once.

use std::fmt::{self, Display};

use crate::internal_prelude::*;

/// What went wrong in a tiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TilingErrorKind {
    /// Two placements select a common element.
    Overlap,
    /// Some element of the shape is selected by no placement.
    Gap,
    /// A placement has the wrong dimension count or reaches outside the shape.
    OutOfBounds,
}

/// Report of the first defect found by [`validate`].
///
/// `participants` holds indices into the validated placement list. For an overlap both are
/// set; for a gap they are the participants bordering the gap along `dimension` (either may
/// be missing at the edges of the shape); for an out-of-bounds placement only the first is
/// set. `index` is the first offending element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilingError {
    pub kind: TilingErrorKind,
    pub dimension: usize,
    pub participants: (Option<usize>, Option<usize>),
    pub index: Vec<Ix>,
}

impl TilingError {
    fn new(
        kind: TilingErrorKind, dimension: usize, participants: (Option<usize>, Option<usize>),
        index: Vec<Ix>,
    ) -> Self {
        Self { kind, dimension, participants, index }
    }
}

fn describe(participant: Option<usize>) -> String {
    participant.map_or_else(|| "the edge".to_owned(), |p| format!("participant {p}"))
}

impl Display for TilingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (a, b) = self.participants;
        match self.kind {
            TilingErrorKind::Overlap => write!(
                f,
                "{} and {} overlap along dimension {} at index {:?}",
                describe(a),
                describe(b),
                self.dimension,
                self.index
            ),
            TilingErrorKind::Gap => write!(
                f,
                "gap along dimension {} at index {:?} between {} and {}",
                self.dimension,
                self.index,
                describe(a),
                describe(b)
            ),
            TilingErrorKind::OutOfBounds => write!(
                f,
                "{} is out of bounds along dimension {} at index {:?}",
                describe(a),
                self.dimension,
                self.index
            ),
        }
    }
}

/// Verifies that `placements` cover every element of `shape` exactly once.
///
/// `placements` holds one entry per participant, in participant order; empty placements
/// take part without covering anything. The common case where every placement is a slab
/// along a single axis is checked with one sort and a linear sweep; arbitrary boxes fall
/// back to a pruned pairwise overlap check, a volume count and, on a deficit, a search
/// for the first uncovered element over the grid of block boundaries.
///
/// Meant for tests and debugging after all participants have finished their part.
pub fn validate(shape: &Shape, placements: &[Placement]) -> Result<()> {
    check_bounds(shape, placements)?;
    let nonempty: Vec<(usize, &Placement)> =
        placements.iter().enumerate().filter(|(_, p)| !p.is_empty()).collect();
    let slab_axis =
        (0..shape.ndim()).find(|&axis| nonempty.iter().all(|(_, p)| p.is_slab_along(shape, axis)));
    match slab_axis {
        Some(axis) => sweep_axis(shape, &nonempty, axis),
        None => sweep_boxes(shape, &nonempty),
    }
}

fn check_bounds(shape: &Shape, placements: &[Placement]) -> Result<(), TilingError> {
    for (i, p) in placements.iter().enumerate() {
        if p.ndim() != shape.ndim() {
            let dimension = p.ndim().min(shape.ndim());
            return Err(TilingError::new(
                TilingErrorKind::OutOfBounds,
                dimension,
                (Some(i), None),
                p.offset().to_vec(),
            ));
        }
        if let Some(axis) = (0..shape.ndim()).find(|&axis| p.end(axis) > shape[axis]) {
            let mut index = p.offset().to_vec();
            index[axis] = shape[axis];
            return Err(TilingError::new(
                TilingErrorKind::OutOfBounds,
                axis,
                (Some(i), None),
                index,
            ));
        }
    }
    Ok(())
}

fn axis_index(ndim: usize, axis: usize, position: Ix) -> Vec<Ix> {
    let mut index = vec![0; ndim];
    index[axis] = position;
    index
}

fn sweep_axis(shape: &Shape, nonempty: &[(usize, &Placement)], axis: usize) -> Result<()> {
    let mut spans: Vec<(Ix, Ix, usize)> =
        nonempty.iter().map(|&(i, p)| (p.offset()[axis], p.end(axis), i)).collect();
    spans.sort_unstable();

    let (mut cursor, mut prev) = (0, None);
    for (start, end, i) in spans {
        if start < cursor {
            return Err(TilingError::new(
                TilingErrorKind::Overlap,
                axis,
                (prev, Some(i)),
                axis_index(shape.ndim(), axis, start),
            )
            .into());
        }
        if start > cursor {
            return Err(TilingError::new(
                TilingErrorKind::Gap,
                axis,
                (prev, Some(i)),
                axis_index(shape.ndim(), axis, cursor),
            )
            .into());
        }
        cursor = end;
        prev = Some(i);
    }
    if cursor < shape[axis] {
        return Err(TilingError::new(
            TilingErrorKind::Gap,
            axis,
            (prev, None),
            axis_index(shape.ndim(), axis, cursor),
        )
        .into());
    }
    Ok(())
}

fn sweep_boxes(shape: &Shape, nonempty: &[(usize, &Placement)]) -> Result<()> {
    let mut sorted = nonempty.to_vec();
    sorted.sort_by_key(|&(i, p)| (p.offset().to_vec(), i));

    for (n, &(i, a)) in sorted.iter().enumerate() {
        for &(j, b) in &sorted[n + 1..] {
            if b.offset()[0] >= a.end(0) {
                break;
            }
            if let Some(common) = a.intersection(b) {
                let dimension = (0..shape.ndim())
                    .find(|&d| a.offset()[d] != b.offset()[d] || a.extent()[d] != b.extent()[d])
                    .unwrap_or(0);
                return Err(TilingError::new(
                    TilingErrorKind::Overlap,
                    dimension,
                    (Some(i.min(j)), Some(i.max(j))),
                    common.offset().to_vec(),
                )
                .into());
            }
        }
    }

    // disjoint and in bounds: equal volumes mean full coverage
    let covered =
        nonempty.iter().try_fold(0u128, |acc, (_, p)| acc.checked_add(volume(p.extent())?));
    if covered.is_some() && covered == volume(shape) {
        return Ok(());
    }
    match first_uncovered(shape, nonempty) {
        Some(index) => Err(gap_at(shape, nonempty, index).into()),
        None => Ok(()),
    }
}

/// Element count of `extent`, `None` if it does not fit in `u128`.
fn volume(extent: &[Ix]) -> Option<u128> {
    extent.iter().try_fold(1u128, |acc, &e| acc.checked_mul(e as u128))
}

/// The lexicographically first element selected by no placement.
///
/// That element has every coordinate either zero or equal to the end of some placement,
/// so only the grid of block boundaries needs to be visited.
fn first_uncovered(shape: &Shape, nonempty: &[(usize, &Placement)]) -> Option<Vec<Ix>> {
    let candidates: Vec<Vec<Ix>> = (0..shape.ndim())
        .map(|axis| {
            let mut c: Vec<Ix> = nonempty
                .iter()
                .map(|(_, p)| p.end(axis))
                .filter(|&end| end < shape[axis])
                .collect();
            c.push(0);
            c.sort_unstable();
            c.dedup();
            c
        })
        .collect();

    let mut cursor = vec![0; shape.ndim()];
    loop {
        let index: Vec<Ix> = cursor.iter().enumerate().map(|(d, &k)| candidates[d][k]).collect();
        if !nonempty.iter().any(|(_, p)| p.contains(&index)) {
            return Some(index);
        }
        // odometer step, last axis fastest
        let mut axis = shape.ndim();
        loop {
            if axis == 0 {
                return None;
            }
            axis -= 1;
            cursor[axis] += 1;
            if cursor[axis] < candidates[axis].len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
}

fn gap_at(shape: &Shape, nonempty: &[(usize, &Placement)], index: Vec<Ix>) -> TilingError {
    let dimension = (0..shape.ndim()).rev().find(|&d| index[d] > 0).unwrap_or(0);
    let before = if index[dimension] > 0 {
        let mut probe = index.clone();
        probe[dimension] -= 1;
        nonempty.iter().find(|(_, p)| p.contains(&probe)).map(|&(i, _)| i)
    } else {
        None
    };
    let after = nonempty
        .iter()
        .filter(|(_, p)| {
            p.offset()[dimension] > index[dimension]
                && (0..shape.ndim()).all(|d| {
                    d == dimension || (index[d] >= p.offset()[d] && index[d] < p.end(d))
                })
        })
        .min_by_key(|(i, p)| (p.offset()[dimension], *i))
        .map(|&(i, _)| i);
    TilingError::new(TilingErrorKind::Gap, dimension, (before, after), index)
}
