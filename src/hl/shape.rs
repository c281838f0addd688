use std::fmt::{self, Debug, Display};
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::internal_prelude::*;

/// Global shape of a dataset: one positive size per dimension.
///
/// The dimensionality of a shape (its rank) and every dimension size are fixed at creation
/// time. A shape is declared once per dataset and snapshot and never changes afterwards;
/// all participants compute their placements against the same shape.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Ix>", into = "Vec<Ix>")]
pub struct Shape {
    dims: Vec<Ix>,
}

impl Shape {
    /// Creates a shape, failing if it has no dimensions or any dimension is zero.
    pub fn new<D: Dimension>(dims: D) -> Result<Self> {
        Self::from_vec(dims.dims())
    }

    pub fn from_vec(dims: Vec<Ix>) -> Result<Self> {
        ensure!(!dims.is_empty(), "shape must have at least one dimension");
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            fail!("shape {:?} has zero size along axis {}", dims, axis);
        }
        Ok(Self { dims })
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> Vec<Ix> {
        self.dims.clone()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of `axis`, or `None` if the axis is out of range.
    pub fn axis(&self, axis: usize) -> Option<Ix> {
        self.dims.get(axis).copied()
    }

    /// Checks that `other` has the same number of dimensions.
    pub(crate) fn check_ndim<D: Dimension>(&self, other: &D, what: &str) -> Result<()> {
        ensure!(
            other.ndim() == self.ndim(),
            "{} ndim ({}) != shape ndim ({})",
            what,
            other.ndim(),
            self.ndim()
        );
        Ok(())
    }
}

impl Dimension for Shape {
    fn ndim(&self) -> usize {
        self.dims.len()
    }

    fn dims(&self) -> Vec<Ix> {
        self.dims.clone()
    }
}

impl Deref for Shape {
    type Target = [Ix];

    fn deref(&self) -> &Self::Target {
        &self.dims
    }
}

impl TryFrom<Vec<Ix>> for Shape {
    type Error = Error;

    fn try_from(dims: Vec<Ix>) -> Result<Self> {
        Self::from_vec(dims)
    }
}

impl From<Shape> for Vec<Ix> {
    fn from(shape: Shape) -> Self {
        shape.dims
    }
}

impl Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Shape({})", self)
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.ndim() == 1 {
            write!(f, "({},)", self[0])
        } else {
            let dims = self.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            write!(f, "({})", dims)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::Shape;
    use crate::internal_prelude::*;

    #[test]
    pub fn test_shape() {
        let s = Shape::new((3, 4)).unwrap();
        assert_eq!(s.ndim(), 2);
        assert_eq!(s.dims(), vec![3, 4]);
        assert_eq!(s.size(), 12);
        assert_eq!(s.axis(1), Some(4));
        assert_eq!(s.axis(2), None);
        assert_eq!(&s[..], &[3, 4]);
        assert_eq!(s, Shape::new([3, 4]).unwrap());
        assert_eq!(s, Shape::new(vec![3, 4]).unwrap());

        assert_eq!(format!("{}", s), "(3, 4)");
        assert_eq!(format!("{:?}", s), "Shape((3, 4))");
        assert_eq!(format!("{}", Shape::new(23).unwrap()), "(23,)");
    }

    #[test]
    pub fn test_shape_invalid() {
        assert_err!(Shape::new(()), "at least one dimension");
        assert_err!(Shape::new([3, 0, 2]), "zero size along axis 1");
        assert_err!(serde_json::from_str::<Shape>("[2, 0]"), "zero size");
    }

    #[test]
    pub fn test_shape_serde() {
        let s = Shape::new([2, 5]).unwrap();
        let text = serde_json::to_string(&s).unwrap();
        assert_eq!(text, "[2,5]");
        assert_eq!(serde_json::from_str::<Shape>(&text).unwrap(), s);
    }

    #[test]
    pub fn test_check_ndim() {
        let s = Shape::new([2, 5]).unwrap();
        assert!(s.check_ndim(&[0, 0], "offset").is_ok());
        assert_err!(s.check_ndim(&[0], "offset"), "offset ndim (1) != shape ndim (2)");
    }
}
