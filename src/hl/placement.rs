use std::fmt::{self, Display};
use std::ops::Range;

use ndarray::{IxDyn, SliceInfo, SliceInfoElem};
use serde::{Deserialize, Serialize};

use crate::internal_prelude::*;

/// A participant's block within a dataset: per-dimension offset and extent.
///
/// ```text
/// shape (6, 8), offset (2, 0), extent (2, 8)
///
/// _ _ _ _ _ _ _ _
/// _ _ _ _ _ _ _ _
/// s s s s s s s s
/// s s s s s s s s
/// _ _ _ _ _ _ _ _
/// _ _ _ _ _ _ _ _
/// ```
///
/// A placement with a zero extent along any axis is *empty*: it selects nothing and is how
/// a participant without local data takes part in a write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPlacement")]
pub struct Placement {
    offset: Vec<Ix>,
    extent: Vec<Ix>,
}

#[derive(Deserialize)]
struct RawPlacement {
    offset: Vec<Ix>,
    extent: Vec<Ix>,
}

impl TryFrom<RawPlacement> for Placement {
    type Error = Error;

    fn try_from(raw: RawPlacement) -> Result<Self> {
        Self::new(raw.offset, raw.extent)
    }
}

impl Placement {
    /// Creates a placement; `offset` and `extent` must have the same number of dimensions.
    pub fn new<O: Dimension, E: Dimension>(offset: O, extent: E) -> Result<Self> {
        let (offset, extent) = (offset.dims(), extent.dims());
        ensure!(
            offset.len() == extent.len(),
            "offset ndim ({}) != extent ndim ({})",
            offset.len(),
            extent.len()
        );
        for (axis, (&o, &e)) in offset.iter().zip(&extent).enumerate() {
            ensure!(o.checked_add(e).is_some(), "placement overflows along axis {}", axis);
        }
        Ok(Self { offset, extent })
    }

    /// The placement covering the whole shape.
    pub fn full(shape: &Shape) -> Self {
        Self { offset: vec![0; shape.ndim()], extent: shape.dims() }
    }

    pub fn offset(&self) -> &[Ix] {
        &self.offset
    }

    pub fn extent(&self) -> &[Ix] {
        &self.extent
    }

    pub fn ndim(&self) -> usize {
        self.offset.len()
    }

    /// Exclusive end index along `axis`.
    pub fn end(&self, axis: usize) -> Ix {
        self.offset[axis] + self.extent[axis]
    }

    /// Number of elements selected.
    pub fn size(&self) -> usize {
        self.extent.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.extent.iter().any(|&e| e == 0)
    }

    /// Returns true if the placement lies within `shape` (dimension count included).
    pub fn fits(&self, shape: &[Ix]) -> bool {
        self.ndim() == shape.len() && (0..self.ndim()).all(|axis| self.end(axis) <= shape[axis])
    }

    /// Index ranges per dimension.
    pub fn ranges(&self) -> Vec<Range<Ix>> {
        (0..self.ndim()).map(|axis| self.offset[axis]..self.end(axis)).collect()
    }

    pub fn contains(&self, index: &[Ix]) -> bool {
        index.len() == self.ndim()
            && index
                .iter()
                .enumerate()
                .all(|(axis, &i)| i >= self.offset[axis] && i < self.end(axis))
    }

    /// Returns the common block of two placements, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if self.ndim() != other.ndim() || self.is_empty() || other.is_empty() {
            return None;
        }
        let mut offset = Vec::with_capacity(self.ndim());
        let mut extent = Vec::with_capacity(self.ndim());
        for axis in 0..self.ndim() {
            let start = self.offset[axis].max(other.offset[axis]);
            let end = self.end(axis).min(other.end(axis));
            if start >= end {
                return None;
            }
            offset.push(start);
            extent.push(end - start);
        }
        Some(Self { offset, extent })
    }

    /// Returns true if the placement spans all of `shape` along every axis except `axis`.
    pub(crate) fn is_slab_along(&self, shape: &[Ix], axis: usize) -> bool {
        (0..self.ndim()).all(|d| d == axis || (self.offset[d] == 0 && self.extent[d] == shape[d]))
    }

    /// Builds an `ndarray` slice selecting this placement inside a global array.
    pub fn slice_info(&self) -> Result<SliceInfo<Vec<SliceInfoElem>, IxDyn, IxDyn>> {
        let elems = self
            .ranges()
            .into_iter()
            .map(|r| SliceInfoElem::Slice {
                start: r.start as isize,
                end: Some(r.end as isize),
                step: 1,
            })
            .collect::<Vec<_>>();
        Ok(SliceInfo::try_from(elems)?)
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ranges = self
            .ranges()
            .into_iter()
            .map(|r| format!("{}..{}", r.start, r.end))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]", ranges)
    }
}
