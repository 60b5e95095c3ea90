use crate::backend::Backend;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::expr::{ExpressionTree, Input, IntoInput};
use crate::op::{Op, ReduceAxis, ReduceOp};
use crate::shape::Shape;

// Reductions — axis dispatch for sum/max/min/argmax/argmin
//
// The axis argument selects one of three reduction families:
//
//   axis == -1          → fold everything            → shape [1]
//   axis == 0           → fold down each column      → shape [cols]
//   1 <= axis <= rank   → fold across each row       → shape [rows]
//
// Anything outside [-1, rank] is rejected. A rank-1 operand of length n is
// read as an n × 1 column, so axis 0 gives [1] and axis 1 gives [n].
// Arg-reductions store positions in the operand's dtype.

/// Build a reduction node of `op` over `x` along `axis`.
pub fn reduce<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    op: ReduceOp,
    axis: isize,
) -> Result<ExpressionTree<B>> {
    let x = x.into_input();
    let shape = x.data_shape(op.name())?;
    let rank = shape.rank();
    if axis < -1 || axis > rank as isize {
        return Err(Error::AxisOutOfRange { axis, rank });
    }
    let (axis, out) = match axis {
        -1 => (ReduceAxis::All, Shape::from(1)),
        0 => (ReduceAxis::Axis0, Shape::from(shape.cols())),
        _ => (ReduceAxis::Axis1, Shape::from(shape.rows())),
    };
    let dtype = x.dtype().unwrap_or(DType::F32);
    ExpressionTree::from_parts(x, Input::Empty, Op::Reduce { op, axis }, None, dtype, out)
}

macro_rules! reduction_builders {
    ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<'a, B: Backend>(
                x: impl IntoInput<'a, B>,
                axis: isize,
            ) -> Result<ExpressionTree<B>> {
                reduce(x, ReduceOp::$op, axis)
            }
        )*
    };
}

reduction_builders!(
    /// Sum along `axis` (-1 for every element).
    sum => Sum,
    max => Max,
    min => Min,
    /// Position of the maximum along `axis`.
    argmax => ArgMax,
    /// Position of the minimum along `axis`.
    argmin => ArgMin,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{array, TestContext};

    #[test]
    fn test_axis_shapes() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 5), DType::F32);
        assert_eq!(sum(&a, -1).unwrap().shape(), &Shape::from(1));
        assert_eq!(sum(&a, 0).unwrap().shape(), &Shape::from(5));
        assert_eq!(max(&a, 1).unwrap().shape(), &Shape::from(3));
        assert_eq!(min(&a, 2).unwrap().shape(), &Shape::from(3));
    }

    #[test]
    fn test_axis_out_of_range() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 5), DType::F32);
        assert!(matches!(
            sum(&a, -2),
            Err(Error::AxisOutOfRange { axis: -2, rank: 2 })
        ));
        assert!(matches!(
            argmax(&a, 3),
            Err(Error::AxisOutOfRange { axis: 3, rank: 2 })
        ));
    }

    #[test]
    fn test_vector_axes() {
        let ctx = TestContext::new();
        let v = array(&ctx, 7, DType::F64);
        assert_eq!(sum(&v, 0).unwrap().shape(), &Shape::from(1));
        assert_eq!(sum(&v, 1).unwrap().shape(), &Shape::from(7));
        assert!(sum(&v, 2).is_err());
    }

    #[test]
    fn test_arg_reduction_node() {
        let ctx = TestContext::new();
        let a = array(&ctx, (2, 2), DType::F64);
        let t = argmin(&a, 0).unwrap();
        assert_eq!(t.dtype(), DType::F64);
        assert_eq!(
            t.op(),
            Op::Reduce {
                op: ReduceOp::ArgMin,
                axis: ReduceAxis::Axis0
            }
        );
    }
}
