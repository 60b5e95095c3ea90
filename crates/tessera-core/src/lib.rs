//! # tessera-core
//!
//! Arrays, strided views and the lazy expression-tree IR for Tessera.
//!
//! This crate provides:
//! - [`Array`] / [`View`] / [`Scalar`] — values over shared device buffers
//! - [`Shape`] / [`Layout`] — column-major shapes, strides, slices and diagonals
//! - [`DType`] / [`HostValue`] — the closed set of element types
//! - [`ExpressionTree`] — the deferred operation graph and its builders
//! - [`Backend`] trait — device buffers, command queues and the execution interface
// - ops: elementwise, structural and statement builders
// - linalg: dot and transpose-fused matrix products
// - reduce: sum/max/min/argmax/argmin along an axis
// - copy: host <-> device transfers (direct or staged)

pub mod array;
pub mod backend;
pub mod copy;
pub mod display;
pub mod dtype;
pub mod error;
pub mod execute;
pub mod expr;
pub mod layout;
pub mod linalg;
pub mod op;
pub mod ops;
pub mod reduce;
pub mod scalar;
pub mod shape;

#[cfg(test)]
pub(crate) mod testing;

pub use array::{Array, AxisIndex, View};
pub use backend::{Backend, BackendBuffer, BackendContext, CommandQueue};
pub use copy::{copy_to_device, copy_to_host, read_bytes, write_bytes};
pub use display::render;
pub use dtype::{DType, HostValue, WithDType};
pub use error::{Error, Result};
pub use execute::{execute, execute_with, ExecutionConfig};
pub use expr::{
    ExpressionNode, ExpressionTree, Input, IntoInput, LoopHeader, LoopIndex, Operand, RepeatSpec,
};
pub use layout::{Layout, Slice};
pub use op::{BinaryOp, MatMulVariant, Op, OpFamily, ReduceAxis, ReduceOp, UnaryOp};
pub use scalar::Scalar;
pub use shape::Shape;
