/// A scalar integer type used for shapes, offsets and extents.
pub type Ix = usize;

/// A trait for anything that can be read as a list of per-axis sizes or indices.
pub trait Dimension {
    fn ndim(&self) -> usize;

    fn dims(&self) -> Vec<Ix>;

    /// Number of elements spanned (1 for zero-dimensional values).
    fn size(&self) -> Ix {
        self.dims().iter().product()
    }
}

impl<'a, T: Dimension + ?Sized> Dimension for &'a T {
    fn ndim(&self) -> usize {
        Dimension::ndim(*self)
    }

    fn dims(&self) -> Vec<Ix> {
        Dimension::dims(*self)
    }
}

impl Dimension for [Ix] {
    fn ndim(&self) -> usize {
        self.len()
    }

    fn dims(&self) -> Vec<Ix> {
        self.to_vec()
    }
}

impl Dimension for Vec<Ix> {
    fn ndim(&self) -> usize {
        self.len()
    }

    fn dims(&self) -> Vec<Ix> {
        self.clone()
    }
}

impl<const N: usize> Dimension for [Ix; N] {
    fn ndim(&self) -> usize {
        N
    }

    fn dims(&self) -> Vec<Ix> {
        self.to_vec()
    }
}

impl Dimension for ndarray::IxDyn {
    fn ndim(&self) -> usize {
        ndarray::Dimension::ndim(self)
    }

    fn dims(&self) -> Vec<Ix> {
        ndarray::Dimension::slice(self).to_vec()
    }
}

macro_rules! count_ty {
    () => { 0 };
    ($_i:ident, $($rest:ident,)*) => { 1 + count_ty!($($rest,)*) }
}

macro_rules! ix {
    ($_i:ident) => { Ix };
}

macro_rules! impl_tuple {
    () => (
        impl Dimension for () {
            fn ndim(&self) -> usize { 0 }
            fn dims(&self) -> Vec<Ix> { vec![] }
        }
    );

    ($head:ident, $($tail:ident,)*) => (
        impl Dimension for (ix!($head), $(ix!($tail),)*) {
            #[inline]
            fn ndim(&self) -> usize {
                count_ty!($head, $($tail,)*)
            }

            #[inline]
            fn dims(&self) -> Vec<Ix> {
                let ($head, $($tail,)*) = *self;
                vec![$head, $($tail,)*]
            }
        }

        impl_tuple! { $($tail,)* }
    );
}

impl_tuple! { a, b, c, d, e, f, }

impl Dimension for Ix {
    fn ndim(&self) -> usize {
        1
    }

    fn dims(&self) -> Vec<Ix> {
        vec![*self]
    }
}

#[cfg(test)]
pub mod tests {
    use super::{Dimension, Ix};

    #[test]
    pub fn test_dimension() {
        fn f<D: Dimension>(d: D) -> (usize, Vec<Ix>, Ix) {
            (d.ndim(), d.dims(), d.size())
        }

        assert_eq!(f(()), (0, vec![], 1));
        assert_eq!(f(&()), (0, vec![], 1));
        assert_eq!(f(2), (1, vec![2], 2));
        assert_eq!(f((3,)), (1, vec![3], 3));
        assert_eq!(f(&(3,)), (1, vec![3], 3));
        assert_eq!(f((1, 2)), (2, vec![1, 2], 2));
        assert_eq!(f((1, 2, 3)), (3, vec![1, 2, 3], 6));
        assert_eq!(f((1, 2, 3, 4, 5, 6)), (6, vec![1, 2, 3, 4, 5, 6], 720));
        assert_eq!(f([4, 0]), (2, vec![4, 0], 0));
        assert_eq!(f(vec![2, 3]), (2, vec![2, 3], 6));
        assert_eq!(f(&vec![2, 3][..]), (2, vec![2, 3], 6));
        assert_eq!(f(ndarray::IxDyn(&[5, 2])), (2, vec![5, 2], 10));
    }
}
