// Interpreter — Walks an expression tree and computes it in host memory
//
// Every intermediate value is a `Dense`: a column-major f64 buffer plus its
// logical shape. Device arrays are decoded into a Dense through their layout
// (so views, slices and diagonals read exactly the elements they cover), and
// results are encoded back through the target's layout on assignment.
//
// Each node's result is rounded through its dtype before its parent sees it,
// so integer division truncates, casts saturate and f32 arithmetic loses the
// precision it would lose on a device.
//
// Statements:
//   Assign  evaluate the right-hand side, then write it into the target
//   Fuse    evaluate every right-hand side of the bundle, then do every write
//   Loop    bind the loop variable and run the body once per iteration

use std::collections::HashMap;

use log::{debug, trace};
use rayon::prelude::*;

use tessera_core::dtype::{DType, HostValue};
use tessera_core::error::{Error, Result};
use tessera_core::expr::{ExpressionTree, LoopHeader, Operand};
use tessera_core::op::{BinaryOp, MatMulVariant, Op, ReduceAxis, ReduceOp, UnaryOp};
use tessera_core::shape::Shape;
use tessera_core::Array;

use crate::HostBackend;

type Tree = ExpressionTree<HostBackend>;

// Dense

/// A fully materialized host value in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub shape: Shape,
    pub data: Vec<f64>,
}

impl Dense {
    pub fn new(shape: Shape, data: Vec<f64>) -> Self {
        Dense { shape, data }
    }

    fn scalar(v: f64) -> Self {
        Dense::new(Shape::from(1), vec![v])
    }

    fn rows(&self) -> usize {
        self.shape.rows()
    }

    fn cols(&self) -> usize {
        self.shape.cols()
    }

    /// Element `(i, j)` of the value read as a matrix.
    fn at(&self, i: usize, j: usize) -> f64 {
        self.data[i + j * self.rows()]
    }

    /// The elements laid out over `target`, repeating length-1 axes.
    fn expand(&self, target: &Shape) -> Result<Vec<f64>> {
        if &self.shape == target {
            return Ok(self.data.clone());
        }
        // A single element fills any target, including rank 0.
        if self.data.len() == 1 {
            return Ok(vec![self.data[0]; target.product()]);
        }
        if !self.shape.broadcasts_to(target) {
            return Err(Error::ShapeMismatch {
                lhs: target.clone(),
                rhs: self.shape.clone(),
            });
        }
        let out_dims = target.dims();
        let src_dims = self.shape.dims();
        let src_strides = self.shape.stride_contiguous();
        let pad = out_dims.len() - src_dims.len();
        let mut index = vec![0; out_dims.len()];
        Ok((0..target.product())
            .map(|flat| {
                unravel(flat, out_dims, &mut index);
                let offset: usize = src_dims
                    .iter()
                    .zip(&src_strides)
                    .enumerate()
                    .map(|(d, (&dim, &stride))| if dim == 1 { 0 } else { index[d + pad] * stride })
                    .sum();
                self.data[offset]
            })
            .collect())
    }

    /// Round every element through `dtype`.
    fn coerce(mut self, dtype: DType) -> Self {
        if dtype != DType::F64 {
            for v in self.data.iter_mut() {
                *v = HostValue::from_f64(dtype, *v).to_f64();
            }
        }
        self
    }
}

/// Column-major multi-index of logical position `flat`.
fn unravel(mut flat: usize, dims: &[usize], index: &mut [usize]) {
    for (i, &d) in index.iter_mut().zip(dims) {
        *i = flat % d.max(1);
        flat /= d.max(1);
    }
}

// Device I/O

fn read_array(array: &Array<HostBackend>) -> Result<Dense> {
    let dtype = array.dtype();
    let size = dtype.size_in_bytes();
    let bytes = array.buffer().read()?;
    let data = array
        .layout()
        .strided_indices()
        .map(|flat| HostValue::read_ne(dtype, &bytes[flat * size..(flat + 1) * size]).to_f64())
        .collect();
    Ok(Dense::new(array.shape().clone(), data))
}

fn write_array(array: &Array<HostBackend>, value: &Dense) -> Result<()> {
    if array.shape().is_empty() {
        trace!("skipping write into empty array of shape {}", array.shape());
        return Ok(());
    }
    let dtype = array.dtype();
    let size = dtype.size_in_bytes();
    let values = value.expand(array.shape())?;
    let mut bytes = array.buffer().write()?;
    for (flat, v) in array.layout().strided_indices().zip(values) {
        HostValue::from_f64(dtype, v).write_ne(&mut bytes[flat * size..(flat + 1) * size]);
    }
    Ok(())
}

// Entry points

/// Execute a statement tree (or evaluate and discard a value tree).
pub(crate) fn run(tree: &Tree) -> Result<()> {
    debug!(
        "host: executing {} over {} node(s)",
        tree.op(),
        tree.nodes().len()
    );
    let mut interpreter = Interpreter {
        tree,
        loops: HashMap::new(),
    };
    interpreter.statement(tree.root())
}

/// Compute a value tree on the host without writing anything to a device.
pub fn evaluate(tree: &Tree) -> Result<Dense> {
    let interpreter = Interpreter {
        tree,
        loops: HashMap::new(),
    };
    interpreter.node(tree.root())
}

struct Interpreter<'t> {
    tree: &'t Tree,
    /// Current value of every bound loop variable, by nesting level.
    loops: HashMap<usize, i64>,
}

impl<'t> Interpreter<'t> {
    // Statements

    fn statement(&mut self, index: usize) -> Result<()> {
        let node = self.tree.node(index);
        match node.op {
            Op::Assign | Op::Fuse => {
                let mut targets = Vec::new();
                self.collect_assignments(index, &mut targets)?;
                let values = targets
                    .iter()
                    .map(|&(_, rhs)| self.operand(rhs))
                    .collect::<Result<Vec<_>>>()?;
                for ((target, _), value) in targets.iter().zip(&values) {
                    write_array(target, value)?;
                }
                Ok(())
            }
            Op::Loop => {
                let header = match &node.rhs {
                    Operand::Loop(header) => *header,
                    _ => return Err(Error::msg("loop node without a loop header")),
                };
                let body = node
                    .lhs
                    .as_composite()
                    .ok_or_else(|| Error::msg("loop body must be a statement"))?;
                self.run_loop(header, body)
            }
            _ => self.node(index).map(|_| ()),
        }
    }

    fn run_loop(&mut self, header: LoopHeader, body: usize) -> Result<()> {
        let level = header.index.level();
        let saved = self.loops.get(&level).copied();
        let mut i = header.start;
        trace!(
            "host: loop {} over {}..{} step {}",
            level,
            header.start,
            header.end,
            header.step
        );
        while (header.step > 0 && i < header.end) || (header.step < 0 && i > header.end) {
            self.loops.insert(level, i);
            self.statement(body)?;
            i += header.step;
        }
        match saved {
            Some(v) => self.loops.insert(level, v),
            None => self.loops.remove(&level),
        };
        Ok(())
    }

    /// Flatten nested fuses into (target, value) pairs, in statement order.
    fn collect_assignments(
        &self,
        index: usize,
        out: &mut Vec<(&'t Array<HostBackend>, &'t Operand<HostBackend>)>,
    ) -> Result<()> {
        let node = self.tree.node(index);
        match node.op {
            Op::Assign => match &node.lhs {
                Operand::Array(target) => {
                    out.push((target, &node.rhs));
                    Ok(())
                }
                _ => Err(Error::msg("assignment target must be an array")),
            },
            Op::Fuse => {
                for side in [&node.lhs, &node.rhs] {
                    let child = side
                        .as_composite()
                        .ok_or_else(|| Error::msg("fuse operands must be statements"))?;
                    self.collect_assignments(child, out)?;
                }
                Ok(())
            }
            other => Err(Error::Unsupported(format!(
                "{other} inside a fused statement on the host backend"
            ))),
        }
    }

    // Values

    fn operand(&self, operand: &Operand<HostBackend>) -> Result<Dense> {
        match operand {
            Operand::Array(array) => read_array(array),
            Operand::Composite(index) => self.node(*index),
            Operand::Value(v) => Ok(Dense::scalar(v.to_f64())),
            Operand::Index(i) => self
                .loops
                .get(&i.level())
                .map(|&v| Dense::scalar(v as f64))
                .ok_or_else(|| {
                    Error::Unsupported(format!("loop index {} used outside its loop", i.level()))
                }),
            Operand::Empty | Operand::Repeat(_) | Operand::Loop(_) => {
                Err(Error::msg("operand does not denote a value"))
            }
        }
    }

    /// An operand used as a position along an axis of length `size`.
    fn position(&self, operand: &Operand<HostBackend>, axis: usize, size: usize) -> Result<usize> {
        let value = self.operand(operand)?;
        let raw = value
            .data
            .first()
            .copied()
            .ok_or_else(|| Error::msg("empty index expression"))?;
        if raw < 0.0 || raw as usize >= size {
            return Err(Error::IndexOutOfBounds {
                axis,
                index: raw.max(0.0) as usize,
                size,
            });
        }
        Ok(raw as usize)
    }

    fn node(&self, index: usize) -> Result<Dense> {
        let node = self.tree.node(index);
        let shape = node.shape.clone();
        let value = match node.op {
            Op::Unary(op) => {
                let x = self.operand(&node.lhs)?;
                Dense::new(shape, x.data.iter().map(|&v| unary(op, v)).collect())
            }
            Op::Binary(op) => {
                let a = self.operand(&node.lhs)?.expand(&shape)?;
                let b = self.operand(&node.rhs)?.expand(&shape)?;
                let data = a.iter().zip(&b).map(|(&x, &y)| binary(op, x, y)).collect();
                Dense::new(shape, data)
            }
            Op::Cast(_) | Op::Reshape => Dense::new(shape, self.operand(&node.lhs)?.data),
            Op::Reduce { op, axis } => reduce(&self.operand(&node.lhs)?, op, axis, shape)?,
            Op::MatMul(variant) => matmul(
                &self.operand(&node.lhs)?,
                &self.operand(&node.rhs)?,
                variant,
                shape,
            ),
            Op::Transpose => rotate(&self.operand(&node.lhs)?, shape),
            Op::Repeat => {
                let x = self.operand(&node.lhs)?;
                let [r, c] = match &node.rhs {
                    Operand::Repeat(spec) => spec.tile,
                    _ => return Err(Error::msg("repeat node without a repeat spec")),
                };
                let (rows, cols) = (shape.rows(), shape.cols());
                let mut data = Vec::with_capacity(rows * cols);
                for j in 0..cols {
                    for i in 0..rows {
                        data.push(x.data[i % r + (j % c) * r]);
                    }
                }
                Dense::new(shape, data)
            }
            Op::Row => {
                let x = self.operand(&node.lhs)?;
                let i = self.position(&node.rhs, 0, x.rows())?;
                Dense::new(shape, (0..x.cols()).map(|j| x.at(i, j)).collect())
            }
            Op::Column => {
                let x = self.operand(&node.lhs)?;
                let j = self.position(&node.rhs, 1, x.cols())?;
                Dense::new(shape, (0..x.rows()).map(|i| x.at(i, j)).collect())
            }
            Op::Access => {
                let x = self.operand(&node.lhs)?;
                let i = self.position(&node.rhs, 0, x.data.len())?;
                Dense::new(shape, vec![x.data[i]])
            }
            Op::Outer => {
                let x = self.operand(&node.lhs)?;
                let y = self.operand(&node.rhs)?;
                let mut data = Vec::with_capacity(x.data.len() * y.data.len());
                for &yj in &y.data {
                    data.extend(x.data.iter().map(|&xi| xi * yj));
                }
                Dense::new(shape, data)
            }
            Op::Identity => {
                let one = self.operand(&node.lhs)?.data[0];
                let zero = self.operand(&node.rhs)?.data[0];
                let rows = shape.rows();
                let data = (0..shape.product())
                    .map(|k| if k % rows.max(1) == k / rows.max(1) { one } else { zero })
                    .collect();
                Dense::new(shape, data)
            }
            Op::Fill => {
                let v = self.operand(&node.lhs)?.data[0];
                Dense::new(shape.clone(), vec![v; shape.product()])
            }
            Op::Assign | Op::Fuse | Op::Loop => {
                return Err(Error::msg(format!("{} statement used as a value", node.op)))
            }
            Op::Invalid => return Err(Error::DegenerateProduct { shape }),
        };
        Ok(value.coerce(node.dtype))
    }
}

// Kernels

fn unary(op: UnaryOp, v: f64) -> f64 {
    match op {
        UnaryOp::Neg => -v,
        UnaryOp::Not => (v == 0.0) as u8 as f64,
        UnaryOp::Abs => v.abs(),
        UnaryOp::Acos => v.acos(),
        UnaryOp::Asin => v.asin(),
        UnaryOp::Atan => v.atan(),
        UnaryOp::Ceil => v.ceil(),
        UnaryOp::Cos => v.cos(),
        UnaryOp::Cosh => v.cosh(),
        UnaryOp::Exp => v.exp(),
        UnaryOp::Floor => v.floor(),
        UnaryOp::Log => v.ln(),
        UnaryOp::Log10 => v.log10(),
        UnaryOp::Sin => v.sin(),
        UnaryOp::Sinh => v.sinh(),
        UnaryOp::Sqrt => v.sqrt(),
        UnaryOp::Tan => v.tan(),
        UnaryOp::Tanh => v.tanh(),
    }
}

fn binary(op: BinaryOp, x: f64, y: f64) -> f64 {
    let flag = |b: bool| b as u8 as f64;
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Maximum => x.max(y),
        BinaryOp::Minimum => x.min(y),
        BinaryOp::Pow => x.powf(y),
        BinaryOp::Gt => flag(x > y),
        BinaryOp::Ge => flag(x >= y),
        BinaryOp::Lt => flag(x < y),
        BinaryOp::Le => flag(x <= y),
        BinaryOp::Eq => flag(x == y),
        BinaryOp::Ne => flag(x != y),
    }
}

/// Fold `values` with `op`. Arg-reductions return the position of the first
/// extreme element.
fn fold(op: ReduceOp, values: impl Iterator<Item = f64>) -> f64 {
    match op {
        ReduceOp::Sum => values.sum(),
        ReduceOp::Max => values.fold(f64::NEG_INFINITY, f64::max),
        ReduceOp::Min => values.fold(f64::INFINITY, f64::min),
        ReduceOp::ArgMax | ReduceOp::ArgMin => {
            let better = |v: f64, best: f64| {
                if op == ReduceOp::ArgMax {
                    v > best
                } else {
                    v < best
                }
            };
            let mut best: Option<(usize, f64)> = None;
            for (i, v) in values.enumerate() {
                match best {
                    Some((_, b)) if !better(v, b) => {}
                    _ => best = Some((i, v)),
                }
            }
            best.map_or(0.0, |(i, _)| i as f64)
        }
    }
}

fn reduce(x: &Dense, op: ReduceOp, axis: ReduceAxis, shape: Shape) -> Result<Dense> {
    if axis != ReduceAxis::All && x.shape.rank() > 2 {
        return Err(Error::Unsupported(format!(
            "{} along axis {:?} of a rank-{} value",
            op.name(),
            axis,
            x.shape.rank()
        )));
    }
    let (rows, cols) = (x.rows(), x.cols());
    let data = match axis {
        ReduceAxis::All => vec![fold(op, x.data.iter().copied())],
        ReduceAxis::Axis0 => (0..cols)
            .map(|j| fold(op, (0..rows).map(|i| x.at(i, j))))
            .collect(),
        ReduceAxis::Axis1 => (0..rows)
            .map(|i| fold(op, (0..cols).map(|j| x.at(i, j))))
            .collect(),
    };
    Ok(Dense::new(shape, data))
}

/// `C = op(A)·op(B)`, where a transposed variant reads its operand's
/// untransposed storage with rows and columns exchanged.
fn matmul(a: &Dense, b: &Dense, variant: MatMulVariant, shape: Shape) -> Dense {
    let (m, n) = (shape.rows(), shape.cols());
    let lhs_t = variant.lhs_transposed();
    let rhs_t = variant.rhs_transposed();
    let k = if lhs_t { a.rows() } else { a.cols() };
    trace!("host: matmul<{variant:?}> {m}x{k} · {k}x{n}");

    let mut data = vec![0.0; m * n];
    if m == 0 || n == 0 {
        return Dense::new(shape, data);
    }
    let lhs = |i: usize, p: usize| if lhs_t { a.at(p, i) } else { a.at(i, p) };
    let rhs = |p: usize, j: usize| if rhs_t { b.at(j, p) } else { b.at(p, j) };
    data.par_chunks_mut(m).enumerate().for_each(|(j, column)| {
        for (i, out) in column.iter_mut().enumerate() {
            *out = (0..k).map(|p| lhs(i, p) * rhs(p, j)).sum();
        }
    });
    Dense::new(shape, data)
}

/// Rotate the axes left by one: output axis `d` is input axis `(d + 1) % rank`.
fn rotate(x: &Dense, shape: Shape) -> Dense {
    let rank = x.shape.rank();
    if rank < 2 {
        return Dense::new(shape, x.data.clone());
    }
    let src_strides = x.shape.stride_contiguous();
    let out_dims = shape.dims();
    let mut index = vec![0; rank];
    let data = (0..shape.product())
        .map(|flat| {
            unravel(flat, out_dims, &mut index);
            let offset: usize = (0..rank)
                .map(|d| index[d] * src_strides[(d + 1) % rank])
                .sum();
            x.data[offset]
        })
        .collect();
    Dense::new(shape, data)
}
