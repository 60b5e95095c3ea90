//! # Tessera
//!
//! A lazy, strided array front end for GPU-style devices.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! # fn main() -> tessera::Result<()> {
//! let ctx = HostContext::new();
//! let a = HostArray::from_slice(&[1.0f32, 2.0, 3.0, 4.0], 4, &ctx)?;
//! a.slice(1..3)?.assign_mul(10.0f32)?;
//! assert_eq!(a.to_vec::<f32>()?, vec![1.0, 20.0, 30.0, 4.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `tessera-core` | Shape, Layout, DType, Array/View/Scalar, expression trees, Backend trait |
//! | `tessera-cpu` | Host-memory backend and tree interpreter with rayon matmul |
//!
//! ## Modules
//!
//! - [`ops`] — element-wise, structural and statement builders
//! - [`linalg`] — `dot`, `matmul` and `matvec` with transpose fusion
//! - [`reduce`] — sum/max/min/argmax/argmin along an axis

/// Re-export core types.
pub use tessera_core::{
    backend::{Backend, BackendBuffer, BackendContext, CommandQueue},
    copy::{copy_to_device, copy_to_host, read_bytes, write_bytes},
    display::render,
    execute::{execute, execute_with, ExecutionConfig},
    expr::{ExpressionNode, ExpressionTree, Input, IntoInput, LoopIndex, Operand},
    op::{BinaryOp, MatMulVariant, Op, OpFamily, ReduceAxis, ReduceOp, UnaryOp},
    Array, AxisIndex, DType, Error, HostValue, Layout, Result, Scalar, Shape, Slice, View,
    WithDType,
};

/// Re-export the host backend.
pub use tessera_cpu::{evaluate, Dense, HostArray, HostBackend, HostBuffer, HostContext, HostQueue};

/// Expression builders.
pub mod ops {
    pub use tessera_core::ops::*;
}

/// Products and transpose fusion.
pub mod linalg {
    pub use tessera_core::linalg::*;
}

/// Axis reductions.
pub mod reduce {
    pub use tessera_core::reduce::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::linalg::{dot, matmul, matvec};
    pub use crate::ops::{
        abs, add, assign, cast, col, div, eq, exp, eye, fill, fuse, gt, log, lt, maximum,
        minimum, mul, neg, norm, outer, pow, ravel, repmat, reshape, row, sfor, sqrt, sub, swap,
        trans, zeros,
    };
    pub use crate::reduce::{argmax, argmin, max, min, sum};
    pub use crate::{
        execute, Array, DType, ExecutionConfig, ExpressionTree, HostArray, HostBackend,
        HostContext, HostValue, LoopIndex, Scalar, Shape, Slice, View,
    };
}
