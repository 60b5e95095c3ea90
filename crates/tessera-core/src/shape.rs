use std::fmt;

use crate::error::{Error, Result};

// Shape — N-dimensional shape representation
//
// A Shape describes the size of each dimension of an array:
//   - Scalar: Shape([])          — 0 dimensions, 1 element
//   - Vector: Shape([5])         — 1 dimension, 5 elements
//   - Matrix: Shape([3, 4])      — 3 rows, 4 columns
//
// Dimensions may be zero. A shape whose `min()` is zero describes an empty
// array; assignments into such arrays are silent no-ops.
//
// Fresh allocations are COLUMN-MAJOR (Fortran order): axis 0 is the fastest
// varying one. For shape [2, 3, 4] the contiguous strides are [1, 2, 6].

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero dimension gives 0.
    pub fn product(&self) -> usize {
        self.0.iter().product()
    }

    /// Alias for [`Shape::product`].
    pub fn elem_count(&self) -> usize {
        self.product()
    }

    /// Largest dimension (1 for a rank-0 shape).
    pub fn max(&self) -> usize {
        self.0.iter().copied().max().unwrap_or(1)
    }

    /// Smallest dimension (1 for a rank-0 shape). Zero means the shape is empty.
    pub fn min(&self) -> usize {
        self.0.iter().copied().min().unwrap_or(1)
    }

    /// Whether any dimension has length zero.
    pub fn is_empty(&self) -> bool {
        self.min() == 0
    }

    /// Rows of the shape viewed as a matrix (1 for rank 0).
    pub fn rows(&self) -> usize {
        self.0.first().copied().unwrap_or(1)
    }

    /// Columns of the shape viewed as a matrix (1 for rank < 2).
    pub fn cols(&self) -> usize {
        self.0.get(1).copied().unwrap_or(1)
    }

    /// Compute the contiguous column-major strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [1, 2, 6]:
    ///   - Moving 1 step in dim 0 jumps 1 element
    ///   - Moving 1 step in dim 1 jumps 2 elements (one full column)
    ///   - Moving 1 step in dim 2 jumps 6 elements (one full matrix)
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.rank());
        let mut acc = 1usize;
        for &d in &self.0 {
            strides.push(acc);
            acc *= d;
        }
        strides
    }

    /// The shape rotated left by one axis: `out[i] = self[(i + 1) % rank]`.
    /// For a matrix this swaps rows and columns.
    pub fn flip(&self) -> Shape {
        let rank = self.rank();
        Shape((0..rank).map(|i| self.0[(i + 1) % rank]).collect())
    }

    // Broadcasting

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// Broadcasting rules:
    ///   1. Right-align the shapes, left-padding the shorter one with 1s.
    ///   2. Per aligned axis the result is `max(a, b)`.
    ///   3. Axes are compatible if they are equal or one of them is 1.
    ///
    /// Examples:
    ///   [3, 4] and [4]     → [3, 4]
    ///   [2, 1] and [1, 3]  → [2, 3]
    ///   [3] and [4]        → Error (3 ≠ 4 and neither is 1)
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            // Index from the right; a missing axis behaves as 1.
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld != rd && ld != 1 && rd != 1 {
                return Err(Error::ShapeMismatch {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                });
            }
            result.push(ld.max(rd));
        }

        result.reverse(); // We built it from the right
        Ok(Shape::new(result))
    }

    /// Whether `self` can be broadcast onto `target` without changing `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        matches!(Shape::broadcast_shape(target, self), Ok(s) if &s == target)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// Convenient From implementations
// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    /// 1-D shape.
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(a: [usize; N]) -> Self {
        Shape(a.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.product(), 1);
        assert_eq!(s.stride_contiguous(), Vec::<usize>::new());
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::from((3, 4));
        assert_eq!(s.rank(), 2);
        assert_eq!(s.product(), 12);
        assert_eq!(s.max(), 4);
        assert_eq!(s.min(), 3);
        // Column-major: stride for dim0 = 1, stride for dim1 = rows
        assert_eq!(s.stride_contiguous(), vec![1, 3]);
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.stride_contiguous(), vec![1, 2, 6]);
        assert_eq!(s.product(), 24);
    }

    #[test]
    fn test_empty_shape() {
        let s = Shape::from((5, 0));
        assert_eq!(s.product(), 0);
        assert_eq!(s.min(), 0);
        assert!(s.is_empty());
    }

    #[test]
    fn test_flip() {
        assert_eq!(Shape::from((2, 5)).flip(), Shape::from((5, 2)));
        assert_eq!(Shape::from(7).flip(), Shape::from(7));
        assert_eq!(Shape::from((2, 3, 4)).flip(), Shape::from((3, 4, 2)));
    }

    #[test]
    fn test_broadcast_examples() {
        let b = |l: Shape, r: Shape| Shape::broadcast_shape(&l, &r);
        assert_eq!(b((3, 4).into(), 4.into()).unwrap(), Shape::from((3, 4)));
        assert_eq!(b((2, 1).into(), (1, 3).into()).unwrap(), Shape::from((2, 3)));
        assert_eq!(
            b((5, 3, 1).into(), (3, 4).into()).unwrap(),
            Shape::from((5, 3, 4))
        );
        assert!(matches!(
            b(3.into(), 4.into()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_broadcast_is_symmetric() {
        let shapes: Vec<Shape> = vec![
            ().into(),
            1.into(),
            4.into(),
            (1, 4).into(),
            (3, 1).into(),
            (3, 4).into(),
            (2, 3, 4).into(),
            (0, 1).into(),
            (2, 0).into(),
        ];
        for a in &shapes {
            for b in &shapes {
                match (Shape::broadcast_shape(a, b), Shape::broadcast_shape(b, a)) {
                    (Ok(x), Ok(y)) => assert_eq!(x, y, "{a} vs {b}"),
                    (Err(_), Err(_)) => {}
                    other => panic!("asymmetric broadcast for {a} and {b}: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_broadcasts_to() {
        assert!(Shape::from(1).broadcasts_to(&Shape::from((3, 4))));
        assert!(Shape::from(4).broadcasts_to(&Shape::from((3, 4))));
        assert!(!Shape::from((3, 4)).broadcasts_to(&Shape::from(4)));
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 4));
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
