//! Tensor shapes: ordered axis dimensions, empty for scalars.
//!
//! A shape describes the value axes of an expression. Free indices are kept
//! separately (see [`crate::index`]); the flattened component space of an
//! expression is row-major over shape axes followed by free-index axes.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Ordered axis dimensions of a tensor value. `Shape::scalar()` has no axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(SmallVec<[usize; 4]>);

impl Shape {
    /// The scalar shape (rank 0, 1 component).
    pub fn scalar() -> Self {
        Shape(SmallVec::new())
    }

    /// Rank-1 shape with `dim` components.
    pub fn vector(dim: usize) -> Self {
        Shape(SmallVec::from_slice(&[dim]))
    }

    /// Rank-2 shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape(SmallVec::from_slice(&[rows, cols]))
    }

    /// Arbitrary-rank shape from explicit axis dimensions.
    pub fn tensor(dims: &[usize]) -> Self {
        Shape(SmallVec::from_slice(dims))
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Axis dimensions in order.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of scalar components (1 for scalars).
    pub fn component_count(&self) -> usize {
        self.0.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (n, d) in self.0.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Row-major flattening helpers
// ---------------------------------------------------------------------------

/// Flattens a multi-coordinate into a single row-major offset over `dims`.
/// The last axis varies fastest.
pub fn flatten_coords(coords: &[usize], dims: &[usize]) -> usize {
    debug_assert_eq!(coords.len(), dims.len());
    let mut flat = 0;
    for (c, d) in coords.iter().zip(dims.iter()) {
        debug_assert!(c < d);
        flat = flat * d + c;
    }
    flat
}

/// Inverse of [`flatten_coords`]: recovers the row-major coordinate of
/// `flat` over `dims`.
pub fn unflatten_coords(mut flat: usize, dims: &[usize]) -> SmallVec<[usize; 4]> {
    let mut coords: SmallVec<[usize; 4]> = SmallVec::from_elem(0, dims.len());
    for axis in (0..dims.len()).rev() {
        coords[axis] = flat % dims[axis];
        flat /= dims[axis];
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.component_count(), 1);
        assert!(s.is_scalar());
    }

    #[test]
    fn vector_shape() {
        let v = Shape::vector(3);
        assert_eq!(v.rank(), 1);
        assert_eq!(v.dims(), &[3]);
        assert_eq!(v.component_count(), 3);
        assert!(!v.is_scalar());
    }

    #[test]
    fn matrix_shape() {
        let m = Shape::matrix(2, 3);
        assert_eq!(m.rank(), 2);
        assert_eq!(m.component_count(), 6);
    }

    #[test]
    fn tensor_shape() {
        let t = Shape::tensor(&[2, 3, 4]);
        assert_eq!(t.rank(), 3);
        assert_eq!(t.component_count(), 24);
    }

    #[test]
    fn display() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::vector(3).to_string(), "(3)");
        assert_eq!(Shape::matrix(2, 3).to_string(), "(2, 3)");
    }

    #[test]
    fn flatten_row_major_last_axis_fastest() {
        let dims = [2usize, 3];
        assert_eq!(flatten_coords(&[0, 0], &dims), 0);
        assert_eq!(flatten_coords(&[0, 2], &dims), 2);
        assert_eq!(flatten_coords(&[1, 0], &dims), 3);
        assert_eq!(flatten_coords(&[1, 2], &dims), 5);
    }

    #[test]
    fn unflatten_inverts_flatten() {
        let dims = [2usize, 3, 4];
        for flat in 0..24 {
            let coords = unflatten_coords(flat, &dims);
            assert_eq!(flatten_coords(&coords, &dims), flat);
        }
    }

    #[test]
    fn flatten_empty_dims_is_zero() {
        assert_eq!(flatten_coords(&[], &[]), 0);
        assert!(unflatten_coords(0, &[]).is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let shape = Shape::matrix(3, 3);
        let json = serde_json::to_string(&shape).unwrap();
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, back);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn flatten_and_unflatten_are_inverse(
                dims in proptest::collection::vec(1usize..5, 0..4),
                seed in any::<usize>(),
            ) {
                let total: usize = dims.iter().product();
                let flat = seed % total;
                let coords = unflatten_coords(flat, &dims);
                prop_assert_eq!(flatten_coords(&coords, &dims), flat);
            }
        }
    }
}
