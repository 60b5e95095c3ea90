use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur while building or handing off array expressions.
///
/// Every variant is raised synchronously, while the expression tree is being
/// constructed, before any device work is attempted. The only exceptions are
/// the backend-reported `Unsupported`/`DegenerateProduct` cases, which surface
/// from the execution interface itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was applied to an array of the wrong rank
    /// (e.g. one-index access on a matrix).
    #[error("dimension mismatch in {op}: expected {expected}, got rank {got}")]
    DimensionMismatch {
        op: &'static str,
        expected: &'static str,
        got: usize,
    },

    /// Two shapes cannot be broadcast together (e.g. [2,3] and [4,5]).
    #[error("shape mismatch: {lhs} and {rhs} are not broadcast-compatible")]
    ShapeMismatch { lhs: Shape, rhs: Shape },

    /// Contraction axes of a matrix or matrix-vector product disagree.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}] — inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Reduction axis outside `[-1, rank]`.
    #[error("axis {axis} is out of range for an array of rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },

    /// A datatype name or code outside the closed numeric set.
    #[error("unknown datatype: {0}")]
    UnknownDataType(String),

    /// DType mismatch between two operands (no implicit promotion).
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Operands bound to different device contexts.
    #[error("context mismatch: {lhs} vs {rhs}")]
    ContextMismatch { lhs: String, rhs: String },

    /// Element count mismatch when moving host data in or out of an array.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Element index past the end of an axis.
    #[error("index {index} out of bounds for axis {axis} of size {size}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        size: usize,
    },

    /// An invalid (empty) product expression was evaluated.
    #[error("degenerate product: expression of shape {shape} has no valid value")]
    DegenerateProduct { shape: Shape },

    /// The execution interface cannot evaluate this operator.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Tessera.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("queue {} does not exist", index)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
