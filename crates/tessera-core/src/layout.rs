use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — Memory layout of an array (shape + strides + start)
//
// The Layout decouples the *logical* shape of an array from how its data is
// arranged in the device buffer. Every element lives at the affine offset
//
//     offset(i₀, …, iₙ) = start + Σ stride[a] · i[a]
//
// measured in elements, not bytes. Changing only start/strides gives views:
//
// 1. **Slice**: per axis (start, step, len) →
//    start += stride[a]·slice.start, stride[a] *= slice.step, shape[a] = len.
//
// 2. **Transpose**: swap the strides (and shape). No data movement.
//
// 3. **Diagonal**: a rank-1 walk whose stride is stride[0] + stride[1].
//
// 4. **Contiguous check**: start == 0 and strides equal the column-major
//    strides of the shape. Only contiguous arrays can be copied to or from
//    the host in a single transfer.

/// A per-axis slice: elements `start, start+step, …` strictly below `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    /// Exclusive end; `None` means "to the end of the axis".
    pub end: Option<usize>,
    pub step: usize,
}

impl Slice {
    pub fn new(start: usize, end: Option<usize>, step: usize) -> Self {
        Slice { start, end, step }
    }

    /// The whole axis.
    pub fn all() -> Self {
        Slice::new(0, None, 1)
    }

    /// `start..end` with unit step.
    pub fn range(start: usize, end: usize) -> Self {
        Slice::new(start, Some(end), 1)
    }

    /// Replace the step.
    pub fn step_by(self, step: usize) -> Self {
        Slice { step, ..self }
    }

    /// Number of elements this slice selects on an axis of length `dim`.
    pub fn len(&self, dim: usize) -> usize {
        let end = self.end.map_or(dim, |e| e.min(dim));
        if self.start >= end || self.step == 0 {
            0
        } else {
            (end - self.start).div_ceil(self.step)
        }
    }
}

impl From<Range<usize>> for Slice {
    fn from(r: Range<usize>) -> Self {
        Slice::range(r.start, r.end)
    }
}

impl From<RangeFrom<usize>> for Slice {
    fn from(r: RangeFrom<usize>) -> Self {
        Slice::new(r.start, None, 1)
    }
}

impl From<RangeTo<usize>> for Slice {
    fn from(r: RangeTo<usize>) -> Self {
        Slice::range(0, r.end)
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::all()
    }
}

/// Layout describes how an array's logical shape maps to flat buffer storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Element offset into the buffer where this array's data starts.
    start: usize,
}

impl Layout {
    /// Create a new contiguous (column-major) layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            start: 0,
        }
    }

    /// Create a layout with explicit strides and start (for views).
    pub fn new(shape: Shape, strides: Vec<usize>, start: usize) -> Self {
        debug_assert_eq!(shape.rank(), strides.len());
        Layout {
            shape,
            strides,
            start,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.product()
    }

    /// Check if this layout is contiguous (column-major, no gaps, start 0).
    /// Strides of length-1 axes are irrelevant and ignored.
    pub fn is_contiguous(&self) -> bool {
        if self.start != 0 {
            return false;
        }
        let expected = self.shape.stride_contiguous();
        self.dims()
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (&s, &e))| d <= 1 || s == e)
    }

    /// One past the largest element offset this layout can touch
    /// (0 for an empty shape).
    pub fn extent(&self) -> usize {
        if self.shape.is_empty() {
            return 0;
        }
        let last: usize = self
            .dims()
            .iter()
            .zip(self.strides.iter())
            .map(|(&d, &s)| (d - 1) * s)
            .sum();
        self.start + last + 1
    }

    /// Apply one slice per axis. The result aliases the same storage.
    pub fn slice_axes(&self, slices: &[Slice]) -> Result<Layout> {
        if slices.len() != self.rank() {
            return Err(Error::msg(format!(
                "expected {} slices for a rank-{} layout, got {}",
                self.rank(),
                self.rank(),
                slices.len()
            )));
        }
        let mut start = self.start;
        let mut dims = Vec::with_capacity(self.rank());
        let mut strides = Vec::with_capacity(self.rank());
        for (axis, slice) in slices.iter().enumerate() {
            if slice.step == 0 {
                return Err(Error::msg(format!("slice step on axis {axis} must be >= 1")));
            }
            let len = slice.len(self.dims()[axis]);
            if len > 0 {
                start += self.strides[axis] * slice.start;
            }
            dims.push(len);
            strides.push(self.strides[axis] * slice.step);
        }
        Ok(Layout::new(Shape::new(dims), strides, start))
    }

    /// The `k`-th diagonal of a rank-2 layout as a rank-1 layout.
    /// `k > 0` selects a super-diagonal, `k < 0` a sub-diagonal.
    pub fn diag(&self, k: isize) -> Result<Layout> {
        if self.rank() != 2 {
            return Err(Error::DimensionMismatch {
                op: "diag",
                expected: "rank 2",
                got: self.rank(),
            });
        }
        let off_i = if k < 0 { k.unsigned_abs() } else { 0 };
        let off_j = if k > 0 { k.unsigned_abs() } else { 0 };
        let (rows, cols) = (self.dims()[0], self.dims()[1]);
        let len = rows.saturating_sub(off_i).min(cols.saturating_sub(off_j));
        let start = if len > 0 {
            self.start + off_i * self.strides[0] + off_j * self.strides[1]
        } else {
            self.start
        };
        Ok(Layout::new(
            Shape::from(len),
            vec![self.strides[0] + self.strides[1]],
            start,
        ))
    }

    /// Compute the flat index into storage for a given multi-dimensional index.
    /// This is the core formula: flat_index = start + sum(index[i] * stride[i])
    pub fn flat_index(&self, index: &[usize]) -> usize {
        let mut flat = self.start;
        for (i, &idx) in index.iter().enumerate() {
            flat += idx * self.strides[i];
        }
        flat
    }

    /// Iterator over all flat indices of this layout, in column-major
    /// logical order (axis 0 fastest).
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

// StridedIter — Iterates over flat storage indices respecting strides
//
// For a contiguous layout this just counts start, start+1, start+2, ...
// For a sliced or transposed layout it jumps around the buffer following the
// strides, still visiting logical elements in column-major order.

/// Iterator that yields flat storage indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    start: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            start: layout.start(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        let mut idx = self.start;
        for i in 0..self.current.len() {
            idx += self.current[i] * self.strides[i];
        }
        idx
    }

    /// Advance the multi-dimensional index by one (leftmost dimension first).
    fn advance(&mut self) {
        for i in 0..self.dims.len() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_layout() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        assert!(layout.is_contiguous());
        assert_eq!(layout.strides(), &[1, 2]);
        assert_eq!(layout.start(), 0);
        assert_eq!(layout.extent(), 6);
    }

    #[test]
    fn test_contiguous_indices() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        let indices: Vec<usize> = layout.strided_indices().collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_row_major_strides_iterate_out_of_order() {
        // A [3, 2] view over a [2, 3] buffer read along its rows.
        let layout = Layout::new(Shape::from((3, 2)), vec![2, 1], 0);
        assert!(!layout.is_contiguous());
        assert_eq!(layout.extent(), 6);
        let indices: Vec<usize> = layout.strided_indices().collect();
        assert_eq!(indices, vec![0, 2, 4, 1, 3, 5]);
    }

    #[test]
    fn test_slice_axes() {
        // [4, 6] rows 1..3, every other column from 0
        let layout = Layout::contiguous(Shape::from((4, 6)));
        let sliced = layout
            .slice_axes(&[Slice::range(1, 3), Slice::all().step_by(2)])
            .unwrap();
        assert_eq!(sliced.dims(), &[2, 3]);
        assert_eq!(sliced.strides(), &[1, 8]);
        assert_eq!(sliced.start(), 1);
        assert_eq!(sliced.flat_index(&[1, 2]), 1 + 1 + 16);
    }

    #[test]
    fn test_slice_composes_with_parent_start() {
        let parent = Layout::new(Shape::from(10), vec![3], 5);
        let child = parent.slice_axes(&[Slice::range(2, 6)]).unwrap();
        assert_eq!(child.start(), 5 + 3 * 2);
        assert_eq!(child.strides(), &[3]);
        assert_eq!(child.dims(), &[4]);
    }

    #[test]
    fn test_slice_len() {
        assert_eq!(Slice::range(1, 3).len(4), 2);
        assert_eq!(Slice::all().step_by(2).len(5), 3);
        assert_eq!(Slice::range(3, 10).len(4), 1);
        assert_eq!(Slice::range(5, 6).len(4), 0);
    }

    #[test]
    fn test_diag() {
        let layout = Layout::contiguous(Shape::from((3, 4)));
        let main = layout.diag(0).unwrap();
        assert_eq!(main.dims(), &[3]);
        assert_eq!(main.strides(), &[4]);
        assert_eq!(main.strided_indices().collect::<Vec<_>>(), vec![0, 4, 8]);

        let upper = layout.diag(1).unwrap();
        assert_eq!(upper.dims(), &[3]);
        assert_eq!(upper.start(), 3);

        let lower = layout.diag(-2).unwrap();
        assert_eq!(lower.dims(), &[1]);
        assert_eq!(lower.start(), 2);

        assert!(Layout::contiguous(Shape::from(3)).diag(0).is_err());
    }

    #[test]
    fn test_is_contiguous_ignores_unit_axes() {
        let layout = Layout::new(Shape::from((1, 4)), vec![7, 1], 0);
        assert!(layout.is_contiguous());
        let offset = Layout::new(Shape::from(4), vec![1], 2);
        assert!(!offset.is_contiguous());
    }

    #[test]
    fn test_flat_index() {
        let layout = Layout::contiguous(Shape::from((2, 3, 4)));
        // Element at [1, 2, 3]: 1*1 + 2*2 + 3*6 = 23
        assert_eq!(layout.flat_index(&[1, 2, 3]), 23);
        assert_eq!(layout.flat_index(&[0, 0, 0]), 0);
    }
}
