use crate::array::Array;
use crate::backend::Backend;
use crate::dtype::{DType, HostValue};
use crate::error::{Error, Result};
use crate::execute::execute;
use crate::expr::{ExpressionTree, Input, IntoInput, LoopHeader, LoopIndex, RepeatSpec};
use crate::op::{BinaryOp, Op, UnaryOp};
use crate::shape::Shape;

// Builders — elementwise, structural and statement nodes
//
// Shape rules for binary nodes:
//
//   array/tree  ∘ array/tree   → broadcast(lhs, rhs)
//   array/tree  ∘ literal/index → the array/tree's shape
//   literal/index ∘ literal/index → [1]
//
// Dtype rules: two device operands must share a dtype (there is no implicit
// promotion); a literal is converted to the dtype of the device operand it
// meets. Comparisons and `not` always produce I32.

/// Resolve dtype, shape and (coerced) operands of an elementwise binary node.
fn resolve_binary<'a, B: Backend>(
    x: Input<'a, B>,
    y: Input<'a, B>,
) -> Result<(DType, Shape, Input<'a, B>, Input<'a, B>)> {
    for input in [&x, &y] {
        if !matches!(
            input,
            Input::Array(_) | Input::Tree(_) | Input::Value(_) | Input::Index(_)
        ) {
            return Err(Error::msg("elementwise operands must be arrays, expressions, literals or loop indices"));
        }
    }
    match (x.shape(), y.shape()) {
        (Some(xs), Some(ys)) => {
            let (xd, yd) = (x.dtype(), y.dtype());
            if let (Some(xd), Some(yd)) = (xd, yd) {
                if xd != yd {
                    return Err(Error::DTypeMismatch {
                        expected: xd,
                        got: yd,
                    });
                }
            }
            let shape = Shape::broadcast_shape(xs, ys)?;
            let dtype = xd.unwrap_or(DType::F32);
            Ok((dtype, shape, x, y))
        }
        (Some(xs), None) => {
            let dtype = x.dtype().unwrap_or(DType::F32);
            Ok((dtype, xs.clone(), x, y.coerce(dtype)))
        }
        (None, Some(ys)) => {
            let dtype = y.dtype().unwrap_or(DType::F32);
            Ok((dtype, ys.clone(), x.coerce(dtype), y))
        }
        (None, None) => {
            let dtype = match (x, y) {
                (Input::Value(v), _) | (_, Input::Value(v)) => v.dtype(),
                _ => DType::I32,
            };
            Ok((dtype, Shape::from(1), x.coerce(dtype), y.coerce(dtype)))
        }
    }
}

pub(crate) fn binary<'a, B: Backend>(
    op: BinaryOp,
    x: Input<'a, B>,
    y: Input<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (dtype, shape, x, y) = resolve_binary(x, y)?;
    let dtype = if op.is_comparison() { DType::I32 } else { dtype };
    ExpressionTree::from_parts(x, y, Op::Binary(op), None, dtype, shape)
}

pub(crate) fn unary<'a, B: Backend>(op: UnaryOp, x: Input<'a, B>) -> Result<ExpressionTree<B>> {
    let shape = x.data_shape(op.name())?.clone();
    let dtype = match (op, x.dtype()) {
        (UnaryOp::Not, _) => DType::I32,
        (_, Some(d)) => d,
        (_, None) => DType::F32,
    };
    ExpressionTree::from_parts(x, Input::Empty, Op::Unary(op), None, dtype, shape)
}

macro_rules! binary_builders {
    ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<'a, B: Backend>(
                x: impl IntoInput<'a, B>,
                y: impl IntoInput<'a, B>,
            ) -> Result<ExpressionTree<B>> {
                binary(BinaryOp::$op, x.into_input(), y.into_input())
            }
        )*
    };
}

binary_builders!(
    /// Element-wise `x + y`.
    add => Add,
    /// Element-wise `x - y`.
    sub => Sub,
    /// Element-wise `x * y`.
    mul => Mul,
    /// Element-wise `x / y`.
    div => Div,
    maximum => Maximum,
    minimum => Minimum,
    /// Element-wise `x ^ y`.
    pow => Pow,
    gt => Gt,
    ge => Ge,
    lt => Lt,
    le => Le,
    eq => Eq,
    ne => Ne,
);

macro_rules! unary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name<'a, B: Backend>(x: impl IntoInput<'a, B>) -> Result<ExpressionTree<B>> {
                unary(UnaryOp::$op, x.into_input())
            }
        )*
    };
}

unary_builders!(
    neg => Neg,
    not => Not,
    abs => Abs,
    acos => Acos,
    asin => Asin,
    atan => Atan,
    ceil => Ceil,
    cos => Cos,
    cosh => Cosh,
    exp => Exp,
    floor => Floor,
    log => Log,
    log10 => Log10,
    sin => Sin,
    sinh => Sinh,
    sqrt => Sqrt,
    tan => Tan,
    tanh => Tanh,
);

// Structural

/// Element-wise conversion to `dtype`.
pub fn cast<'a, B: Backend>(x: impl IntoInput<'a, B>, dtype: DType) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let shape = x.data_shape("cast")?.clone();
    ExpressionTree::from_parts(x, Input::Empty, Op::Cast(dtype), None, dtype, shape)
}

/// Lazy transpose: the result shape is the operand's shape rotated left by
/// one axis, so a `[m, n]` matrix becomes `[n, m]`.
pub fn trans<'a, B: Backend>(x: impl IntoInput<'a, B>) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let shape = x.data_shape("trans")?.flip();
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(x, Input::Empty, Op::Transpose, None, dtype, shape)
}

/// Reinterpret the operand (in column-major order) under a new shape.
pub fn reshape<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    shape: impl Into<Shape>,
) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let shape = shape.into();
    let src = x.data_shape("reshape")?.product();
    if src != shape.product() {
        return Err(Error::ReshapeElementMismatch {
            src,
            dst: shape.product(),
            dst_shape: shape,
        });
    }
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(x, Input::Empty, Op::Reshape, None, dtype, shape)
}

/// Flatten to rank 1.
pub fn ravel<'a, B: Backend>(x: impl IntoInput<'a, B>) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let n = x.data_shape("ravel")?.product();
    reshape(x, n)
}

/// Tile a vector or matrix `r1` times vertically and `r2` times horizontally.
/// A rank-1 operand of length `n` is treated as an `n × 1` column.
pub fn repmat<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    r1: usize,
    r2: usize,
) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let shape = x.data_shape("repmat")?;
    if shape.rank() > 2 {
        return Err(Error::DimensionMismatch {
            op: "repmat",
            expected: "rank <= 2",
            got: shape.rank(),
        });
    }
    let tile = [shape.rows(), shape.cols()];
    let spec = RepeatSpec {
        reps: [r1, r2],
        tile,
    };
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(
        x,
        Input::Repeat(spec),
        Op::Repeat,
        None,
        dtype,
        Shape::from((r1 * tile[0], r2 * tile[1])),
    )
}

fn matrix_access<'a, B: Backend>(
    x: Input<'a, B>,
    i: Input<'a, B>,
    op: Op,
    name: &'static str,
) -> Result<ExpressionTree<B>> {
    let shape = x.data_shape(name)?;
    if shape.rank() != 2 {
        return Err(Error::DimensionMismatch {
            op: name,
            expected: "rank 2",
            got: shape.rank(),
        });
    }
    if !matches!(i, Input::Value(_) | Input::Index(_) | Input::Tree(_)) {
        return Err(Error::msg(format!(
            "{name} index must be a literal, loop index or expression"
        )));
    }
    let len = if op == Op::Row { shape.cols() } else { shape.rows() };
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(x, i, op, None, dtype, Shape::from(len))
}

/// Row `i` of a matrix, shape `[cols]`.
pub fn row<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    i: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    matrix_access(x.into_input(), i.into_input(), Op::Row, "row")
}

/// Column `i` of a matrix, shape `[rows]`.
pub fn col<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    i: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    matrix_access(x.into_input(), i.into_input(), Op::Column, "col")
}

/// Element `index` of `x` as a one-element expression.
pub fn access<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    index: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    x.data_shape("access")?;
    let index = index.into_input();
    if !matches!(index, Input::Value(_) | Input::Index(_)) {
        return Err(Error::msg("access index must be a literal or loop index"));
    }
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(x, index, Op::Access, None, dtype, Shape::from(1))
}

/// Outer product of two vectors, shape `[len(x), len(y)]`.
/// A rank-0 operand degrades to an element-wise product.
pub fn outer<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    y: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (x, y) = (x.into_input(), y.into_input());
    let xr = x.shape().map_or(0, Shape::rank);
    let yr = y.shape().map_or(0, Shape::rank);
    if xr > 1 || yr > 1 {
        return Err(Error::DimensionMismatch {
            op: "outer",
            expected: "rank <= 1",
            got: xr.max(yr),
        });
    }
    if xr == 0 || yr == 0 {
        return binary(BinaryOp::Mul, x, y);
    }
    let dtype = x.dtype().unwrap_or(DType::F32);
    if let Some(yd) = y.dtype() {
        if yd != dtype {
            return Err(Error::DTypeMismatch {
                expected: dtype,
                got: yd,
            });
        }
    }
    let shape = Shape::from((
        x.shape().map_or(1, Shape::max),
        y.shape().map_or(1, Shape::max),
    ));
    ExpressionTree::from_parts(x, y, Op::Outer, None, dtype, shape)
}

/// Every element set to `value` (converted to `dtype`).
pub fn fill<B: Backend>(
    shape: impl Into<Shape>,
    value: impl Into<HostValue>,
    dtype: DType,
    context: &B::Context,
) -> Result<ExpressionTree<B>> {
    let value = HostValue::from_f64(dtype, value.into().to_f64());
    ExpressionTree::from_parts(
        Input::Value(value),
        Input::Empty,
        Op::Fill,
        Some(context.clone()),
        dtype,
        shape.into(),
    )
}

/// An `m × n` matrix of zeros.
pub fn zeros<B: Backend>(
    m: usize,
    n: usize,
    dtype: DType,
    context: &B::Context,
) -> Result<ExpressionTree<B>> {
    fill((m, n), 0i32, dtype, context)
}

/// An `m × n` matrix with ones on the main diagonal.
pub fn eye<B: Backend>(
    m: usize,
    n: usize,
    dtype: DType,
    context: &B::Context,
) -> Result<ExpressionTree<B>> {
    ExpressionTree::from_parts(
        Input::Value(HostValue::from_f64(dtype, 1.0)),
        Input::Value(HostValue::from_f64(dtype, 0.0)),
        Op::Identity,
        Some(context.clone()),
        dtype,
        Shape::from((m, n)),
    )
}

/// `‖x‖₁` (`order == 1`) or `‖x‖₂` (`order == 2`), shape `[1]`.
pub fn norm<'a, B: Backend>(x: impl IntoInput<'a, B>, order: u32) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    match order {
        1 => crate::reduce::sum(&abs(x)?, -1),
        2 => sqrt(&crate::reduce::sum(&pow(x, 2i32)?, -1)?),
        other => Err(Error::msg(format!("norm order must be 1 or 2, got {other}"))),
    }
}

// Statements

/// `x = y` as an expression. `y` must broadcast onto `x`'s shape, and a
/// device `y` must have `x`'s dtype.
pub fn assign<'a, B: Backend>(
    x: &'a Array<B>,
    y: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let y = y.into_input();
    if !matches!(
        y,
        Input::Array(_) | Input::Tree(_) | Input::Value(_) | Input::Index(_)
    ) {
        return Err(Error::msg("assignment source must be an array, expression or literal"));
    }
    if let Some(dtype) = y.dtype() {
        if dtype != x.dtype() {
            return Err(Error::DTypeMismatch {
                expected: x.dtype(),
                got: dtype,
            });
        }
    }
    if let Some(shape) = y.shape() {
        if !shape.broadcasts_to(x.shape()) {
            return Err(Error::ShapeMismatch {
                lhs: x.shape().clone(),
                rhs: shape.clone(),
            });
        }
    }
    ExpressionTree::from_parts(
        Input::Array(x),
        y.coerce(x.dtype()),
        Op::Assign,
        None,
        x.dtype(),
        x.shape().clone(),
    )
}

/// Bundle two statements into one unit. Each reads the values the other
/// sees *before* either writes.
pub fn fuse<B: Backend>(x: &ExpressionTree<B>, y: &ExpressionTree<B>) -> Result<ExpressionTree<B>> {
    ExpressionTree::from_parts(
        Input::Tree(x),
        Input::Tree(y),
        Op::Fuse,
        None,
        x.dtype(),
        x.shape().clone(),
    )
}

/// Plane rotation: `x, y = c·x + s·y, c·y − s·x` as one fused statement.
pub fn rot<'a, B: Backend>(
    x: &'a Array<B>,
    y: &'a Array<B>,
    c: impl IntoInput<'a, B>,
    s: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (c, s) = (c.into_input(), s.into_input());
    let new_x = add(&mul(c, x)?, &mul(s, y)?)?;
    let new_y = sub(&mul(c, y)?, &mul(s, x)?)?;
    fuse(&assign(x, &new_x)?, &assign(y, &new_y)?)
}

/// Exchange the contents of two arrays (executes immediately).
pub fn swap<B: Backend>(x: &Array<B>, y: &Array<B>) -> Result<()> {
    let into_y = assign(y, &mul(1i32, x)?)?;
    let into_x = assign(x, &mul(1i32, y)?)?;
    execute(&fuse(&into_y, &into_x)?)
}

/// `for index in (start..end).step_by(step) { body }` as a statement.
pub fn sfor<B: Backend>(
    index: LoopIndex,
    start: i64,
    end: i64,
    step: i64,
    body: &ExpressionTree<B>,
) -> Result<ExpressionTree<B>> {
    if step == 0 {
        crate::bail!("sfor step must be non-zero");
    }
    let header = LoopHeader {
        index,
        start,
        end,
        step,
    };
    ExpressionTree::from_parts(
        Input::Tree(body),
        Input::Loop(header),
        Op::Loop,
        None,
        body.dtype(),
        body.shape().clone(),
    )
}
