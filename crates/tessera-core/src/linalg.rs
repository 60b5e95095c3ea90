use log::trace;

use crate::backend::Backend;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::expr::{ExpressionTree, Input, IntoInput, Operand};
use crate::op::{BinaryOp, MatMulVariant, Op};
use crate::ops::{binary, fill, repmat, reshape, trans};
use crate::reduce::sum;
use crate::shape::Shape;

// Matrix products — transpose fusion and dot dispatch
//
// Products never materialize a transpose. When an operand of a product is
// (possibly wrapped) `trans(B)`, the product node is rewritten to read `B`
// directly and its variant records the transposition:
//
//   dot(trans(A), B)         → matmul<TN>(A, B)
//   dot(A, trans(B))         → matmul<NT>(A, B)
//   dot(trans(A), trans(B))  → matmul<TT>(A, B)
//
// The operand walk looks through pure wrappers (same-shape reshapes and
// same-dtype casts) and counts transposes on the way down; an even count
// cancels, an odd count leaves a single T. The node's result shape is fixed
// before the rewrite and never changes.
//
// Matrix-vector products are spelled with broadcast primitives:
//
//   A·x   = sum(A ⊙ repmat(reshape(x, [1, n]), m, 1), axis 1)
//   Aᵀ·x  = sum(B ⊙ repmat(x, 1, m), axis 0)        where A = trans(B)

/// Follow transposes and pure wrappers starting at `operand`.
/// Returns the first substantive operand and the number of transposes passed.
fn peel<B: Backend>(tree: &ExpressionTree<B>, operand: &Operand<B>) -> (Operand<B>, usize) {
    let mut current = operand.clone();
    let mut flips = 0;
    while let Some(index) = current.as_composite() {
        let node = tree.node(index);
        let child_shape = tree.operand_shape(&node.lhs);
        let passes = match node.op {
            Op::Transpose => {
                let is_matrix = child_shape.map_or(false, |s| s.rank() == 2);
                if is_matrix {
                    flips += 1;
                }
                is_matrix
            }
            Op::Reshape => child_shape == Some(&node.shape),
            Op::Cast(dtype) => tree.operand_dtype(&node.lhs) == Some(dtype),
            _ => false,
        };
        if !passes {
            break;
        }
        current = node.lhs.clone();
    }
    (current, flips)
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Lhs,
    Rhs,
}

/// Rewrite one operand of `node` past its transposes. Returns whether the
/// operand must be read transposed.
fn fold_transposes<B: Backend>(tree: &mut ExpressionTree<B>, node: usize, side: Side) -> bool {
    let operand = match side {
        Side::Lhs => tree.node(node).lhs.clone(),
        Side::Rhs => tree.node(node).rhs.clone(),
    };
    let (peeled, flips) = peel(tree, &operand);
    if flips == 0 {
        return false;
    }
    trace!(
        "eliding {flips} transpose(s) on the {side:?} operand of node {node} ({})",
        tree.node(node).op
    );
    let target = tree.node_mut(node);
    match side {
        Side::Lhs => target.lhs = peeled,
        Side::Rhs => target.rhs = peeled,
    }
    flips % 2 == 1
}

fn common_dtype<B: Backend>(x: &Input<'_, B>, y: &Input<'_, B>) -> Result<DType> {
    match (x.dtype(), y.dtype()) {
        (Some(xd), Some(yd)) if xd != yd => Err(Error::DTypeMismatch {
            expected: xd,
            got: yd,
        }),
        (Some(d), _) | (_, Some(d)) => Ok(d),
        (None, None) => Ok(DType::F32),
    }
}

fn require_matrix(shape: &Shape, op: &'static str) -> Result<(usize, usize)> {
    if shape.rank() != 2 {
        return Err(Error::DimensionMismatch {
            op,
            expected: "rank 2",
            got: shape.rank(),
        });
    }
    Ok((shape.dims()[0], shape.dims()[1]))
}

/// Matrix-matrix product `x · y` with transpose fusion.
pub fn matmul<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    y: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (x, y) = (x.into_input(), y.into_input());
    let (m, k1) = require_matrix(x.data_shape("matmul")?, "matmul")?;
    let (k2, n) = require_matrix(y.data_shape("matmul")?, "matmul")?;
    if k1 != k2 {
        return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
    }
    let dtype = common_dtype(&x, &y)?;
    let mut tree = ExpressionTree::from_parts(
        x,
        y,
        Op::MatMul(MatMulVariant::NN),
        None,
        dtype,
        Shape::from((m, n)),
    )?;
    let root = tree.root();
    let lhs_t = fold_transposes(&mut tree, root, Side::Lhs);
    let rhs_t = fold_transposes(&mut tree, root, Side::Rhs);
    tree.node_mut(root).op = Op::MatMul(MatMulVariant::from_flags(lhs_t, rhs_t));
    Ok(tree)
}

/// Matrix-vector product `a · x`, shape `[rows(a)]`.
pub fn matvec<'a, B: Backend>(
    a: impl IntoInput<'a, B>,
    x: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (a, x) = (a.into_input(), x.into_input());
    let (m, n) = require_matrix(a.data_shape("matvec")?, "matvec")?;
    let xs = x.data_shape("matvec")?;
    if xs.rank() != 1 {
        return Err(Error::DimensionMismatch {
            op: "matvec",
            expected: "rank 1",
            got: xs.rank(),
        });
    }
    if xs.dims()[0] != n {
        return Err(Error::MatmulShapeMismatch {
            m,
            k1: n,
            k2: xs.dims()[0],
            n: 1,
        });
    }
    let dtype = common_dtype(&a, &x)?;

    let (peeled, flips) = match a {
        Input::Tree(t) => peel(t, &Operand::Composite(t.root())),
        _ => (Operand::Empty, 0),
    };

    // `a` is absorbed first, so its node indices are unchanged in the product tree.
    if flips % 2 == 1 {
        trace!("matvec: eliding {flips} transpose(s) on the matrix operand");
        let tiled = repmat(x, 1, m)?;
        let mut prod = ExpressionTree::from_parts(
            a,
            Input::Tree(&tiled),
            Op::Binary(BinaryOp::Mul),
            None,
            dtype,
            Shape::from((n, m)),
        )?;
        let root = prod.root();
        prod.node_mut(root).lhs = peeled;
        sum(&prod, 0)
    } else {
        let tiled = repmat(&reshape(x, (1, n))?, m, 1)?;
        let mut prod = binary(BinaryOp::Mul, a, Input::Tree(&tiled))?;
        if flips > 0 {
            trace!("matvec: eliding {flips} transpose(s) on the matrix operand");
            let root = prod.root();
            prod.node_mut(root).lhs = peeled;
        }
        sum(&prod, 1)
    }
}

/// Generalized dot product of vectors and matrices.
///
/// The first matching rule wins:
///
/// 1. either operand has one element → element-wise product;
/// 2. `x` is `[m, 0]` → zeros of shape `[m, n]` (or `[m]` for a vector `y`);
/// 3. `x` has a leading zero axis, or `y` is `[k, 0]` → an invalid node of shape `[0]`;
/// 4. vector · vector → sum of the element-wise product;
/// 5. `[1, n]` · vector or vector · `[n, 1]` → reshape, multiply, sum;
/// 6. matrix · vector or vector · matrix → matrix-vector product;
/// 7. matrix · matrix → transpose-fused matrix product.
pub fn dot<'a, B: Backend>(
    x: impl IntoInput<'a, B>,
    y: impl IntoInput<'a, B>,
) -> Result<ExpressionTree<B>> {
    let (x, y) = (x.into_input(), y.into_input());
    let xs = x.data_shape("dot")?;
    let ys = y.data_shape("dot")?;
    for s in [xs, ys] {
        if s.rank() > 2 {
            return Err(Error::DimensionMismatch {
                op: "dot",
                expected: "rank <= 2",
                got: s.rank(),
            });
        }
    }
    let dtype = common_dtype(&x, &y)?;

    if xs.product() == 1 || ys.product() == 1 {
        return binary(BinaryOp::Mul, x, y);
    }

    let context = || {
        x.context()
            .or(y.context())
            .cloned()
            .ok_or_else(|| Error::msg("dot operands carry no device context"))
    };

    if xs.rank() == 2 && xs.dims()[1] == 0 {
        if ys.rows() != 0 {
            return Err(Error::MatmulShapeMismatch {
                m: xs.dims()[0],
                k1: 0,
                k2: ys.rows(),
                n: ys.cols(),
            });
        }
        let shape = if ys.rank() == 2 {
            Shape::from((xs.dims()[0], ys.dims()[1]))
        } else {
            Shape::from(xs.dims()[0])
        };
        return fill(shape, 0i32, dtype, &context()?);
    }

    if xs.dims()[0] == 0 || (ys.rank() == 2 && ys.dims()[1] == 0) {
        return ExpressionTree::from_parts(
            Input::Empty,
            Input::Empty,
            Op::Invalid,
            Some(context()?),
            dtype,
            Shape::from(0),
        );
    }

    match (xs.rank(), ys.rank()) {
        (1, 1) => {
            if xs.dims()[0] != ys.dims()[0] {
                return Err(Error::MatmulShapeMismatch {
                    m: 1,
                    k1: xs.dims()[0],
                    k2: ys.dims()[0],
                    n: 1,
                });
            }
            sum(&binary(BinaryOp::Mul, x, y)?, -1)
        }
        (2, 1) if xs.dims()[0] == 1 => {
            let k = xs.dims()[1];
            if k != ys.dims()[0] {
                return Err(Error::MatmulShapeMismatch {
                    m: 1,
                    k1: k,
                    k2: ys.dims()[0],
                    n: 1,
                });
            }
            sum(&binary(BinaryOp::Mul, Input::Tree(&reshape(x, k)?), y)?, -1)
        }
        (1, 2) if ys.dims()[1] == 1 => {
            let k = ys.dims()[0];
            if k != xs.dims()[0] {
                return Err(Error::MatmulShapeMismatch {
                    m: 1,
                    k1: xs.dims()[0],
                    k2: k,
                    n: 1,
                });
            }
            sum(&binary(BinaryOp::Mul, x, Input::Tree(&reshape(y, k)?))?, -1)
        }
        (2, 1) => matvec(x, y),
        (1, 2) => matvec(&trans(y)?, x),
        _ => matmul(x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{add, cast, mul};
    use crate::op::{ReduceAxis, ReduceOp};
    use crate::testing::{array, TestContext};

    fn operand_is<B: Backend>(operand: &Operand<B>, array: &crate::Array<B>) -> bool {
        matches!(operand, Operand::Array(a) if a.same_buffer(array) && a.layout() == array.layout())
    }

    #[test]
    fn test_variants_and_rewrites() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 4), DType::F32);
        let b = array(&ctx, (3, 5), DType::F32);
        let c = array(&ctx, (5, 4), DType::F32);
        let d = array(&ctx, (4, 5), DType::F32);

        let nn = dot(&a, &d).unwrap();
        assert_eq!(nn.op(), Op::MatMul(MatMulVariant::NN));
        assert_eq!(nn.shape(), &Shape::from((3, 5)));

        let tn = dot(&trans(&a).unwrap(), &b).unwrap();
        assert_eq!(tn.op(), Op::MatMul(MatMulVariant::TN));
        assert_eq!(tn.shape(), &Shape::from((4, 5)));
        assert!(operand_is(&tn.root_node().lhs, &a));

        let nt = dot(&a, &trans(&c).unwrap()).unwrap();
        assert_eq!(nt.op(), Op::MatMul(MatMulVariant::NT));
        assert!(operand_is(&nt.root_node().rhs, &c));

        let tt = dot(&trans(&a).unwrap(), &trans(&c).unwrap());
        assert!(matches!(tt, Err(Error::MatmulShapeMismatch { .. })));
        let tt = dot(&trans(&d).unwrap(), &trans(&a).unwrap()).unwrap();
        assert_eq!(tt.op(), Op::MatMul(MatMulVariant::TT));
        assert_eq!(tt.shape(), &Shape::from((5, 3)));
    }

    #[test]
    fn test_double_transpose_cancels() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 4), DType::F32);
        let b = array(&ctx, (4, 2), DType::F32);
        let tt = trans(&trans(&a).unwrap()).unwrap();
        assert_eq!(tt.shape(), a.shape());
        let p = dot(&tt, &b).unwrap();
        assert_eq!(p.op(), Op::MatMul(MatMulVariant::NN));
        assert!(operand_is(&p.root_node().lhs, &a));
    }

    #[test]
    fn test_peels_pure_wrappers() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 4), DType::F32);
        let b = array(&ctx, (3, 2), DType::F32);
        let wrapped = cast(&reshape(&trans(&a).unwrap(), (4, 3)).unwrap(), DType::F32).unwrap();
        let p = dot(&wrapped, &b).unwrap();
        assert_eq!(p.op(), Op::MatMul(MatMulVariant::TN));
        assert!(operand_is(&p.root_node().lhs, &a));

        // A real reshape is substantive and stops the walk.
        let v = array(&ctx, 12, DType::F32);
        let r = reshape(&trans(&reshape(&v, (3, 4)).unwrap()).unwrap(), (4, 3)).unwrap();
        let p = dot(&r, &b).unwrap();
        assert_eq!(p.op(), Op::MatMul(MatMulVariant::TN));
        assert!(matches!(p.root_node().lhs, Operand::Composite(_)));
    }

    #[test]
    fn test_non_transpose_tree_stays_nn() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 4), DType::F32);
        let b = array(&ctx, (4, 2), DType::F32);
        let sum_tree = add(&a, &a).unwrap();
        let p = dot(&sum_tree, &b).unwrap();
        assert_eq!(p.op(), Op::MatMul(MatMulVariant::NN));
        assert!(matches!(p.root_node().lhs, Operand::Composite(_)));
    }

    #[test]
    fn test_dot_scalar_rule() {
        let ctx = TestContext::new();
        let s = array(&ctx, 1, DType::F64);
        let m = array(&ctx, (3, 4), DType::F64);
        let t = dot(&s, &m).unwrap();
        assert_eq!(t.op(), Op::Binary(BinaryOp::Mul));
        assert_eq!(t.shape(), &Shape::from((3, 4)));
    }

    #[test]
    fn test_dot_empty_rules() {
        let ctx = TestContext::new();
        let x = array(&ctx, (3, 0), DType::F32);
        let y = array(&ctx, (0, 5), DType::F32);
        let z = dot(&x, &y).unwrap();
        assert_eq!(z.op(), Op::Fill);
        assert_eq!(z.shape(), &Shape::from((3, 5)));

        let yv = array(&ctx, 0, DType::F32);
        assert_eq!(dot(&x, &yv).unwrap().shape(), &Shape::from(3));

        let lead = array(&ctx, (0, 4), DType::F32);
        let w = array(&ctx, (4, 2), DType::F32);
        let inv = dot(&lead, &w).unwrap();
        assert_eq!(inv.op(), Op::Invalid);
        assert_eq!(inv.shape(), &Shape::from(0));

        let narrow = array(&ctx, (4, 0), DType::F32);
        let m = array(&ctx, (2, 4), DType::F32);
        assert_eq!(dot(&m, &narrow).unwrap().op(), Op::Invalid);
    }

    #[test]
    fn test_dot_vector_rules() {
        let ctx = TestContext::new();
        let x = array(&ctx, 4, DType::F32);
        let y = array(&ctx, 4, DType::F32);
        let t = dot(&x, &y).unwrap();
        assert_eq!(t.shape(), &Shape::from(1));
        assert_eq!(
            t.op(),
            Op::Reduce {
                op: ReduceOp::Sum,
                axis: ReduceAxis::All
            }
        );
        let short = array(&ctx, 3, DType::F32);
        assert!(matches!(dot(&x, &short), Err(Error::MatmulShapeMismatch { .. })));

        let row = array(&ctx, (1, 4), DType::F32);
        assert_eq!(dot(&row, &y).unwrap().shape(), &Shape::from(1));
        let colm = array(&ctx, (4, 1), DType::F32);
        assert_eq!(dot(&x, &colm).unwrap().shape(), &Shape::from(1));
    }

    #[test]
    fn test_dot_matvec_shapes() {
        let ctx = TestContext::new();
        let a = array(&ctx, (3, 4), DType::F32);
        let x = array(&ctx, 4, DType::F32);
        let v = dot(&a, &x).unwrap();
        assert_eq!(v.shape(), &Shape::from(3));
        assert_eq!(
            v.op(),
            Op::Reduce {
                op: ReduceOp::Sum,
                axis: ReduceAxis::Axis1
            }
        );

        let u = array(&ctx, 3, DType::F32);
        let w = dot(&u, &a).unwrap();
        assert_eq!(w.shape(), &Shape::from(4));
        // vector · matrix reads the matrix through its transpose: reduce along axis 0.
        assert_eq!(
            w.op(),
            Op::Reduce {
                op: ReduceOp::Sum,
                axis: ReduceAxis::Axis0
            }
        );
        let prod = w.node(w.root_node().lhs.as_composite().unwrap());
        assert_eq!(prod.shape, Shape::from((3, 4)));
        assert!(operand_is(&prod.lhs, &a));

        assert!(matches!(dot(&a, &u), Err(Error::MatmulShapeMismatch { .. })));
    }

    #[test]
    fn test_dot_rank_and_dtype_errors() {
        let ctx = TestContext::new();
        let cube = array(&ctx, (2, 2, 2), DType::F32);
        let m = array(&ctx, (2, 2), DType::F32);
        assert!(matches!(dot(&cube, &m), Err(Error::DimensionMismatch { .. })));
        let md = array(&ctx, (2, 2), DType::F64);
        assert!(matches!(dot(&m, &md), Err(Error::DTypeMismatch { .. })));
    }

    #[test]
    fn test_dot_accepts_trees() {
        let ctx = TestContext::new();
        let a = array(&ctx, (2, 3), DType::F32);
        let b = array(&ctx, (3, 2), DType::F32);
        let scaled = mul(&a, 2.0f32).unwrap();
        let p = dot(&scaled, &b).unwrap();
        assert_eq!(p.shape(), &Shape::from((2, 2)));
        let total = sum(&p, -1).unwrap();
        assert_eq!(total.context(), Some(&ctx));
        assert_eq!(total.nodes().len(), 3);
    }
}
