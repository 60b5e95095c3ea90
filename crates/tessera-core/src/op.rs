use std::fmt;

use crate::dtype::DType;

// Op — Operator descriptors recorded in expression-tree nodes
//
// Every node of an ExpressionTree carries one Op. The Op says WHAT the node
// computes; the node's operands say on WHAT. Ops are grouped into families
// because the execution side dispatches on the family first (elementwise
// kernels, reductions, products, statements) and only then on the code:
//
//   Elementwise  unary/binary math, comparisons, casts
//   Reduction    sum/max/min/argmax/argmin over all, axis 0 or axis 1
//   Product      matrix-matrix products in the four transpose variants
//   Structural   transpose, reshape, repmat, row/column access, outer, fills
//   Statement    assign, fuse, loops
//
// Reshape nodes that keep their child's shape and casts that keep their
// child's dtype are "pure wrappers": they do not change any value, so the
// matrix-product normalizer looks through them.

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Logical not; yields `I32` 0/1.
    Not,
    Abs,
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Floor,
    Log,
    Log10,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::Abs => "abs",
            UnaryOp::Acos => "acos",
            UnaryOp::Asin => "asin",
            UnaryOp::Atan => "atan",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Cos => "cos",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Exp => "exp",
            UnaryOp::Floor => "floor",
            UnaryOp::Log => "log",
            UnaryOp::Log10 => "log10",
            UnaryOp::Sin => "sin",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Tan => "tan",
            UnaryOp::Tanh => "tanh",
        }
    }
}

/// Element-wise binary operations (arithmetic and comparisons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
    Pow,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Comparisons always produce `I32` 0/1 regardless of operand dtype.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Maximum => "maximum",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Pow => "pow",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
        }
    }
}

/// Reduction operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
    ArgMax,
    ArgMin,
}

impl ReduceOp {
    /// Arg-reductions return positions, not values.
    pub fn is_arg(&self) -> bool {
        matches!(self, ReduceOp::ArgMax | ReduceOp::ArgMin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::ArgMax => "argmax",
            ReduceOp::ArgMin => "argmin",
        }
    }
}

/// Which elements a reduction folds together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceAxis {
    /// Every element; result shape `{1}`.
    All,
    /// Down each column (along axis 0); result shape `{cols}`.
    Axis0,
    /// Across each row (along axis 1); result shape `{rows}`.
    Axis1,
}

/// The four matrix-product variants. `T` means the corresponding operand
/// node holds the *untransposed* child and the product reads it transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatMulVariant {
    NN,
    NT,
    TN,
    TT,
}

impl MatMulVariant {
    pub fn from_flags(lhs_transposed: bool, rhs_transposed: bool) -> Self {
        match (lhs_transposed, rhs_transposed) {
            (false, false) => MatMulVariant::NN,
            (false, true) => MatMulVariant::NT,
            (true, false) => MatMulVariant::TN,
            (true, true) => MatMulVariant::TT,
        }
    }

    pub fn lhs_transposed(&self) -> bool {
        matches!(self, MatMulVariant::TN | MatMulVariant::TT)
    }

    pub fn rhs_transposed(&self) -> bool {
        matches!(self, MatMulVariant::NT | MatMulVariant::TT)
    }
}

/// Operator family, the coarse dispatch key of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Elementwise,
    Reduction,
    Product,
    Structural,
    Statement,
    Invalid,
}

/// The operator descriptor stored in every expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Element-wise conversion to the given dtype.
    Cast(DType),
    Reduce {
        op: ReduceOp,
        axis: ReduceAxis,
    },
    MatMul(MatMulVariant),
    /// Shape rotated left by one axis (rank 2: ordinary transpose).
    Transpose,
    /// Reinterpret in column-major order under the node's shape.
    Reshape,
    /// Tile the lhs; the rhs is a repeat spec.
    Repeat,
    /// Row `rhs` of the matrix lhs.
    Row,
    /// Column `rhs` of the matrix lhs.
    Column,
    /// Element `rhs` of the lhs, indexed by a loop variable or literal.
    Access,
    /// Outer product of two vectors.
    Outer,
    /// Identity pattern: ones on the main diagonal, zeros elsewhere.
    Identity,
    /// Every element set to the literal lhs.
    Fill,
    /// Write rhs into the array lhs.
    Assign,
    /// Two statements run as one unit; each reads the other's pre-update values.
    Fuse,
    /// Repeat the lhs statement over a loop header in the rhs.
    Loop,
    /// Placeholder for a product that has no valid value.
    Invalid,
}

impl Op {
    pub fn family(&self) -> OpFamily {
        match self {
            Op::Unary(_) | Op::Binary(_) | Op::Cast(_) => OpFamily::Elementwise,
            Op::Reduce { .. } => OpFamily::Reduction,
            Op::MatMul(_) => OpFamily::Product,
            Op::Transpose
            | Op::Reshape
            | Op::Repeat
            | Op::Row
            | Op::Column
            | Op::Access
            | Op::Outer
            | Op::Identity
            | Op::Fill => OpFamily::Structural,
            Op::Assign | Op::Fuse | Op::Loop => OpFamily::Statement,
            Op::Invalid => OpFamily::Invalid,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Unary(op) => f.write_str(op.name()),
            Op::Binary(op) => f.write_str(op.name()),
            Op::Cast(dtype) => write!(f, "cast<{dtype}>"),
            Op::Reduce { op, axis } => write!(f, "{}<{:?}>", op.name(), axis),
            Op::MatMul(variant) => write!(f, "matmul<{variant:?}>"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_flags() {
        for (l, r) in [(false, false), (false, true), (true, false), (true, true)] {
            let v = MatMulVariant::from_flags(l, r);
            assert_eq!(v.lhs_transposed(), l);
            assert_eq!(v.rhs_transposed(), r);
        }
        assert_eq!(MatMulVariant::from_flags(true, false), MatMulVariant::TN);
    }

    #[test]
    fn test_families() {
        assert_eq!(Op::Binary(BinaryOp::Add).family(), OpFamily::Elementwise);
        assert_eq!(Op::MatMul(MatMulVariant::NT).family(), OpFamily::Product);
        assert_eq!(Op::Fuse.family(), OpFamily::Statement);
        assert_eq!(Op::Invalid.family(), OpFamily::Invalid);
        assert!(BinaryOp::Le.is_comparison());
        assert!(!BinaryOp::Pow.is_comparison());
    }

    #[test]
    fn test_display() {
        assert_eq!(Op::Unary(UnaryOp::Log10).to_string(), "log10");
        assert_eq!(Op::Cast(DType::F32).to_string(), "cast<f32>");
        assert_eq!(Op::MatMul(MatMulVariant::TT).to_string(), "matmul<TT>");
        assert_eq!(Op::Transpose.to_string(), "transpose");
    }
}
