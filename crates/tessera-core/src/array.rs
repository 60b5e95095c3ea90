use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::sync::Arc;

use log::trace;

use crate::backend::{Backend, BackendBuffer};
use crate::copy::copy_to_device;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::execute::{execute_with, ExecutionConfig};
use crate::expr::{ExpressionTree, IntoInput};
use crate::layout::{Layout, Slice};
use crate::op::BinaryOp;
use crate::ops;
use crate::scalar::Scalar;
use crate::shape::Shape;

// Array — A strided window onto a shared device buffer
//
// An Array is {dtype, layout (shape + strides + start), buffer, context}.
// Everything except the buffer's *contents* is fixed for the lifetime of the
// value. Arrays that share a buffer alias each other: writing through one is
// visible through all.
//
// MEMORY MODEL:
//
//   Array<B> is a handle around Arc<ArrayInner>. Cloning the handle is O(1).
//   The buffer itself sits behind a second Arc so that views created by
//   slicing, diag(), at() etc. hold the allocation alive without copying it.
//   The buffer is freed when the last Array/View referencing it drops.
//
//   There is no mutation protection on the buffer contents: the device owns
//   ordering, and every triggering call (assignment, copy) is synchronous
//   unless a non-blocking copy is requested explicitly.
//
// VIEWS:
//
//   A View is simply an Array built over an existing buffer. It never
//   allocates; `is_view()` records the distinction.

struct ArrayInner<B: Backend> {
    buffer: Arc<B::Buffer>,
    layout: Layout,
    dtype: DType,
    context: B::Context,
    is_view: bool,
}

/// An n-dimensional array backed by a device buffer.
pub struct Array<B: Backend> {
    inner: Arc<ArrayInner<B>>,
}

/// An Array aliasing another array's buffer.
pub type View<B> = Array<B>;

impl<B: Backend> Clone for Array<B> {
    fn clone(&self) -> Self {
        Array {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Array<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Array(shape={}, strides={:?}, start={}, dtype={}, context={:?}{})",
            self.shape(),
            self.strides(),
            self.start(),
            self.dtype(),
            self.inner.context,
            if self.inner.is_view { ", view" } else { "" },
        )
    }
}

/// Per-axis selector for two-index access: a single position (the axis is
/// dropped) or a slice (the axis is kept).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisIndex {
    Single(usize),
    Range(Slice),
}

impl From<usize> for AxisIndex {
    fn from(i: usize) -> Self {
        AxisIndex::Single(i)
    }
}

impl From<Slice> for AxisIndex {
    fn from(s: Slice) -> Self {
        AxisIndex::Range(s)
    }
}

impl From<Range<usize>> for AxisIndex {
    fn from(r: Range<usize>) -> Self {
        AxisIndex::Range(r.into())
    }
}

impl From<RangeFrom<usize>> for AxisIndex {
    fn from(r: RangeFrom<usize>) -> Self {
        AxisIndex::Range(r.into())
    }
}

impl From<RangeTo<usize>> for AxisIndex {
    fn from(r: RangeTo<usize>) -> Self {
        AxisIndex::Range(r.into())
    }
}

impl From<RangeFull> for AxisIndex {
    fn from(r: RangeFull) -> Self {
        AxisIndex::Range(r.into())
    }
}

impl<B: Backend> Array<B> {
    // Constructors

    /// Allocate a contiguous column-major array. Contents are unspecified.
    pub fn new(shape: impl Into<Shape>, dtype: DType, context: &B::Context) -> Result<Self> {
        Self::with_layout(Layout::contiguous(shape.into()), dtype, context)
    }

    /// Allocate a buffer large enough for `layout` (explicit start/strides).
    pub fn with_layout(layout: Layout, dtype: DType, context: &B::Context) -> Result<Self> {
        // Zero-size arrays still get a one-element allocation.
        let bytes = layout.extent().max(1) * dtype.size_in_bytes();
        let buffer = B::allocate(context, bytes)?;
        Ok(Self::from_buffer(Arc::new(buffer), layout, dtype, context.clone(), false))
    }

    /// Allocate and fill from host data given in column-major order.
    pub fn from_slice<T: WithDType>(
        data: &[T],
        shape: impl Into<Shape>,
        context: &B::Context,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.product() {
            return Err(Error::ElementCountMismatch {
                expected: shape.product(),
                got: data.len(),
                shape,
            });
        }
        let array = Self::new(shape, T::DTYPE, context)?;
        copy_to_device(data, &array)?;
        Ok(array)
    }

    /// Allocate an `m × n` matrix from a list of rows. Stored column-major.
    pub fn from_slice_2d<T: WithDType>(rows: &[Vec<T>], context: &B::Context) -> Result<Self> {
        let m = rows.len();
        let n = rows.first().map_or(0, Vec::len);
        let shape = Shape::from((m, n));
        if let Some(bad) = rows.iter().find(|r| r.len() != n) {
            return Err(Error::ElementCountMismatch {
                shape: Shape::from(n),
                expected: n,
                got: bad.len(),
            });
        }
        let mut data = Vec::with_capacity(m * n);
        for j in 0..n {
            data.extend(rows.iter().map(|r| r[j]));
        }
        Self::from_slice(&data, shape, context)
    }

    /// Wrap an existing buffer. The layout's extent must fit in the buffer.
    pub fn view_of(
        buffer: Arc<B::Buffer>,
        layout: Layout,
        dtype: DType,
        context: &B::Context,
    ) -> Result<Self> {
        let needed = layout.extent() * dtype.size_in_bytes();
        if needed > buffer.size_in_bytes() {
            return Err(Error::msg(format!(
                "view of shape {} needs {needed} bytes, buffer holds {}",
                layout.shape(),
                buffer.size_in_bytes()
            )));
        }
        Ok(Self::from_buffer(buffer, layout, dtype, context.clone(), true))
    }

    /// Allocate an array of the tree's shape and dtype and assign the tree to it.
    pub fn from_tree(tree: &ExpressionTree<B>) -> Result<Self> {
        let context = tree
            .context()
            .ok_or_else(|| Error::msg("expression has no device context to allocate on"))?;
        let array = Self::new(tree.shape().clone(), tree.dtype(), context)?;
        array.assign(tree)?;
        Ok(array)
    }

    /// A fresh contiguous array holding a copy of this array's elements.
    pub fn deep_copy(&self) -> Result<Self> {
        let array = Self::new(self.shape().clone(), self.dtype(), self.context())?;
        array.assign(self)?;
        Ok(array)
    }

    fn from_buffer(
        buffer: Arc<B::Buffer>,
        layout: Layout,
        dtype: DType,
        context: B::Context,
        is_view: bool,
    ) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                buffer,
                layout,
                dtype,
                context,
                is_view,
            }),
        }
    }

    /// A view sharing this array's buffer under a different layout.
    fn view_with_layout(&self, layout: Layout) -> Self {
        Self::from_buffer(
            Arc::clone(&self.inner.buffer),
            layout,
            self.inner.dtype,
            self.inner.context.clone(),
            true,
        )
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn strides(&self) -> &[usize] {
        self.inner.layout.strides()
    }

    /// Element offset of the first element in the buffer.
    pub fn start(&self) -> usize {
        self.inner.layout.start()
    }

    pub fn context(&self) -> &B::Context {
        &self.inner.context
    }

    pub fn buffer(&self) -> &Arc<B::Buffer> {
        &self.inner.buffer
    }

    pub fn is_view(&self) -> bool {
        self.inner.is_view
    }

    /// Contiguous column-major with zero start: eligible for direct transfer.
    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether both arrays alias the same allocation.
    pub fn same_buffer(&self, other: &Array<B>) -> bool {
        Arc::ptr_eq(&self.inner.buffer, &other.inner.buffer)
    }

    // Views

    /// A view of the whole array.
    pub fn view(&self) -> View<B> {
        self.view_with_layout(self.inner.layout.clone())
    }

    fn check_index(&self, axis: usize, index: usize) -> Result<()> {
        let size = self.dims().get(axis).copied().unwrap_or(1);
        if index >= size {
            return Err(Error::IndexOutOfBounds { axis, index, size });
        }
        Ok(())
    }

    /// One-index access on a vector (or rank-0 array) as a Scalar view.
    pub fn at(&self, i: usize) -> Result<Scalar<B>> {
        if self.rank() > 1 {
            return Err(Error::DimensionMismatch {
                op: "at",
                expected: "rank <= 1",
                got: self.rank(),
            });
        }
        self.check_index(0, i)?;
        let stride = self.strides().first().copied().unwrap_or(1);
        let layout = Layout::new(Shape::from(1), vec![stride], self.start() + i * stride);
        Scalar::from_view(self.view_with_layout(layout))
    }

    /// Two-index access on a matrix as a Scalar view.
    pub fn at2(&self, i: usize, j: usize) -> Result<Scalar<B>> {
        Scalar::from_view(self.slice2(i, j)?)
    }

    /// Slice a vector.
    pub fn slice(&self, s: impl Into<Slice>) -> Result<View<B>> {
        if self.rank() != 1 {
            return Err(Error::DimensionMismatch {
                op: "slice",
                expected: "rank 1",
                got: self.rank(),
            });
        }
        self.slice_axes(&[s.into()])
    }

    /// Two-index access on a matrix with any mix of positions and slices.
    /// Axes selected by a single position are dropped from the result;
    /// if both are, the result has shape `[1]`.
    pub fn slice2(&self, i: impl Into<AxisIndex>, j: impl Into<AxisIndex>) -> Result<View<B>> {
        if self.rank() != 2 {
            return Err(Error::DimensionMismatch {
                op: "slice2",
                expected: "rank 2",
                got: self.rank(),
            });
        }
        let selectors = [i.into(), j.into()];
        let mut slices = Vec::with_capacity(2);
        for (axis, sel) in selectors.iter().enumerate() {
            match *sel {
                AxisIndex::Single(p) => {
                    self.check_index(axis, p)?;
                    slices.push(Slice::range(p, p + 1));
                }
                AxisIndex::Range(s) => slices.push(s),
            }
        }
        let sliced = self.inner.layout.slice_axes(&slices)?;
        let mut dims = Vec::new();
        let mut strides = Vec::new();
        for (axis, sel) in selectors.iter().enumerate() {
            if let AxisIndex::Range(_) = sel {
                dims.push(sliced.dims()[axis]);
                strides.push(sliced.strides()[axis]);
            }
        }
        if dims.is_empty() {
            dims.push(1);
            strides.push(1);
        }
        Ok(self.view_with_layout(Layout::new(Shape::new(dims), strides, sliced.start())))
    }

    /// One slice per axis. Rank is preserved.
    pub fn slice_axes(&self, slices: &[Slice]) -> Result<View<B>> {
        let layout = self.inner.layout.slice_axes(slices)?;
        Ok(self.view_with_layout(layout))
    }

    /// The `k`-th diagonal of a matrix as a vector view.
    pub fn diag(&self, k: isize) -> Result<View<B>> {
        let layout = self.inner.layout.diag(k)?;
        Ok(self.view_with_layout(layout))
    }

    // Assignment

    /// `self = rhs`, executed immediately with the default configuration.
    pub fn assign<'a>(&'a self, rhs: impl IntoInput<'a, B>) -> Result<()> {
        self.assign_with(rhs, &ExecutionConfig::default())
    }

    /// `self = rhs` with explicit execution options.
    ///
    /// Assigning into an array with a zero-length axis does nothing.
    pub fn assign_with<'a>(
        &'a self,
        rhs: impl IntoInput<'a, B>,
        config: &ExecutionConfig,
    ) -> Result<()> {
        if self.shape().is_empty() {
            trace!("skipping assignment into empty array of shape {}", self.shape());
            return Ok(());
        }
        let tree = ops::assign(self, rhs)?;
        execute_with(&tree, config)
    }

    fn compound_assign<'a>(&'a self, op: BinaryOp, rhs: impl IntoInput<'a, B>) -> Result<()> {
        if self.shape().is_empty() {
            trace!("skipping {} into empty array of shape {}", op.name(), self.shape());
            return Ok(());
        }
        let value = ops::binary(op, self.into_input(), rhs.into_input())?;
        self.assign(&value)
    }

    /// `self += rhs`
    pub fn assign_add<'a>(&'a self, rhs: impl IntoInput<'a, B>) -> Result<()> {
        self.compound_assign(BinaryOp::Add, rhs)
    }

    /// `self -= rhs`
    pub fn assign_sub<'a>(&'a self, rhs: impl IntoInput<'a, B>) -> Result<()> {
        self.compound_assign(BinaryOp::Sub, rhs)
    }

    /// `self *= rhs`
    pub fn assign_mul<'a>(&'a self, rhs: impl IntoInput<'a, B>) -> Result<()> {
        self.compound_assign(BinaryOp::Mul, rhs)
    }

    /// `self /= rhs`
    pub fn assign_div<'a>(&'a self, rhs: impl IntoInput<'a, B>) -> Result<()> {
        self.compound_assign(BinaryOp::Div, rhs)
    }
}
