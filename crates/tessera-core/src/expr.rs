use crate::array::Array;
use crate::backend::{Backend, BackendContext};
use crate::dtype::{DType, HostValue};
use crate::error::{Error, Result};
use crate::op::Op;
use crate::shape::Shape;

// ExpressionTree — The deferred operation graph
//
// Builders never compute. Each builder call allocates exactly one node and
// returns a tree whose root is that node:
//
//   let t = add(&a, &mul(&b, 2.0f32)?)?;
//
//   nodes: [0] mul(b, 2.0)      shape [n], dtype f32
//          [1] add(a, #0)       shape [n], dtype f32   ← root
//
// Nodes live in a flat arena (Vec) and refer to each other by index
// (`Operand::Composite`). When a builder receives a whole tree as an operand
// it appends that tree's nodes to the new arena, shifting their composite
// indices. Arrays are held by reference-counted handle, so a tree keeps every
// buffer it touches alive until it is dropped.
//
// Every node records the dtype and shape its producing builder computed.
// Those are fixed at creation; the only later mutation is the operand
// rewriting done by the matrix-product normalizer, which never changes a
// node's result shape.

/// A symbolic loop variable used by `sfor` bodies (`access`, `row`, `col`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopIndex(usize);

impl LoopIndex {
    /// The loop variable bound at nesting `level` (0 = outermost).
    pub fn new(level: usize) -> Self {
        LoopIndex(level)
    }

    pub fn level(&self) -> usize {
        self.0
    }
}

/// Parameters of a `repmat` node: the operand is viewed as a
/// `tile[0] × tile[1]` matrix and repeated `reps[0] × reps[1]` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepeatSpec {
    pub reps: [usize; 2],
    pub tile: [usize; 2],
}

/// Bounds of an `sfor` loop: `index` runs over `start, start+step, …` below `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopHeader {
    pub index: LoopIndex,
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

/// One side of an expression node.
#[derive(Debug, Clone)]
pub enum Operand<B: Backend> {
    /// No operand (unary nodes, fills).
    Empty,
    /// A device array, held by shared handle.
    Array(Array<B>),
    /// Another node of the same tree, by arena index.
    Composite(usize),
    /// A host literal.
    Value(HostValue),
    /// A symbolic loop variable.
    Index(LoopIndex),
    Repeat(RepeatSpec),
    Loop(LoopHeader),
}

impl<B: Backend> Operand<B> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Operand::Empty)
    }

    pub fn as_composite(&self) -> Option<usize> {
        match self {
            Operand::Composite(i) => Some(*i),
            _ => None,
        }
    }

    fn shifted(&self, offset: usize) -> Self {
        match self {
            Operand::Composite(i) => Operand::Composite(i + offset),
            other => other.clone(),
        }
    }
}

/// A single node: operator descriptor, two operands, and the result dtype/shape.
#[derive(Debug, Clone)]
pub struct ExpressionNode<B: Backend> {
    pub op: Op,
    pub lhs: Operand<B>,
    pub rhs: Operand<B>,
    pub dtype: DType,
    pub shape: Shape,
}

impl<B: Backend> ExpressionNode<B> {
    fn shifted(&self, offset: usize) -> Self {
        ExpressionNode {
            op: self.op,
            lhs: self.lhs.shifted(offset),
            rhs: self.rhs.shifted(offset),
            dtype: self.dtype,
            shape: self.shape.clone(),
        }
    }
}

/// An arena of nodes plus the root index and the resolved context.
#[derive(Debug, Clone)]
pub struct ExpressionTree<B: Backend> {
    nodes: Vec<ExpressionNode<B>>,
    root: usize,
    context: Option<B::Context>,
}

impl<B: Backend> ExpressionTree<B> {
    /// Allocate one node over `lhs`/`rhs` and return the tree rooted at it.
    ///
    /// Trees passed as operands are merged into the new arena. The context is
    /// taken from `context` or the operands; operands bound to different
    /// contexts are rejected.
    pub(crate) fn from_parts(
        lhs: Input<'_, B>,
        rhs: Input<'_, B>,
        op: Op,
        context: Option<B::Context>,
        dtype: DType,
        shape: Shape,
    ) -> Result<Self> {
        let mut resolved = context;
        for input in [&lhs, &rhs] {
            if let Some(ctx) = input.context() {
                match &resolved {
                    Some(existing) if existing != ctx => {
                        return Err(Error::ContextMismatch {
                            lhs: existing.name(),
                            rhs: ctx.name(),
                        })
                    }
                    Some(_) => {}
                    None => resolved = Some(ctx.clone()),
                }
            }
        }

        let mut nodes = Vec::new();
        let lhs = Self::absorb(&mut nodes, lhs);
        let rhs = Self::absorb(&mut nodes, rhs);
        nodes.push(ExpressionNode {
            op,
            lhs,
            rhs,
            dtype,
            shape,
        });
        Ok(ExpressionTree {
            root: nodes.len() - 1,
            nodes,
            context: resolved,
        })
    }

    fn absorb(nodes: &mut Vec<ExpressionNode<B>>, input: Input<'_, B>) -> Operand<B> {
        match input {
            Input::Empty => Operand::Empty,
            Input::Array(array) => Operand::Array(array.clone()),
            Input::Tree(tree) => {
                let offset = nodes.len();
                nodes.extend(tree.nodes.iter().map(|n| n.shifted(offset)));
                Operand::Composite(tree.root + offset)
            }
            Input::Value(v) => Operand::Value(v),
            Input::Index(i) => Operand::Index(i),
            Input::Repeat(spec) => Operand::Repeat(spec),
            Input::Loop(header) => Operand::Loop(header),
        }
    }

    // Accessors

    pub fn nodes(&self) -> &[ExpressionNode<B>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &ExpressionNode<B> {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut ExpressionNode<B> {
        &mut self.nodes[index]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn root_node(&self) -> &ExpressionNode<B> {
        &self.nodes[self.root]
    }

    /// The context every array in the tree is bound to, if any array is.
    pub fn context(&self) -> Option<&B::Context> {
        self.context.as_ref()
    }

    pub fn dtype(&self) -> DType {
        self.root_node().dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.root_node().shape
    }

    pub fn rank(&self) -> usize {
        self.shape().rank()
    }

    pub fn op(&self) -> Op {
        self.root_node().op
    }

    /// Shape of an operand of this tree (`None` for literals and sentinels).
    pub fn operand_shape<'t>(&'t self, operand: &'t Operand<B>) -> Option<&'t Shape> {
        match operand {
            Operand::Array(a) => Some(a.shape()),
            Operand::Composite(i) => Some(&self.nodes[*i].shape),
            _ => None,
        }
    }

    /// Dtype of an operand of this tree (`None` for literals and sentinels).
    pub fn operand_dtype(&self, operand: &Operand<B>) -> Option<DType> {
        match operand {
            Operand::Array(a) => Some(a.dtype()),
            Operand::Composite(i) => Some(self.nodes[*i].dtype),
            Operand::Value(v) => Some(v.dtype()),
            _ => None,
        }
    }
}

// Input — What a builder accepts as an operand
//
// Arrays and trees are borrowed; the builder clones array handles and copies
// tree nodes into its own arena. Literals and loop indices are copied.

/// A borrowed builder operand.
#[derive(Debug)]
pub enum Input<'a, B: Backend> {
    Array(&'a Array<B>),
    Tree(&'a ExpressionTree<B>),
    Value(HostValue),
    Index(LoopIndex),
    Repeat(RepeatSpec),
    Loop(LoopHeader),
    Empty,
}

impl<'a, B: Backend> Clone for Input<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Backend> Copy for Input<'a, B> {}

impl<'a, B: Backend> Input<'a, B> {
    /// Shape of array and tree operands; `None` for everything else.
    pub fn shape(&self) -> Option<&'a Shape> {
        match *self {
            Input::Array(a) => Some(a.shape()),
            Input::Tree(t) => Some(t.shape()),
            _ => None,
        }
    }

    /// Dtype of array and tree operands; `None` for everything else.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Input::Array(a) => Some(a.dtype()),
            Input::Tree(t) => Some(t.dtype()),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&'a B::Context> {
        match *self {
            Input::Array(a) => Some(a.context()),
            Input::Tree(t) => t.context(),
            _ => None,
        }
    }

    /// Whether this operand is device data (an array or a tree).
    pub fn is_data(&self) -> bool {
        matches!(self, Input::Array(_) | Input::Tree(_))
    }

    /// Literals adopt the dtype of the device operand they are combined with.
    pub(crate) fn coerce(self, dtype: DType) -> Self {
        match self {
            Input::Value(v) if v.dtype() != dtype => {
                Input::Value(HostValue::from_f64(dtype, v.to_f64()))
            }
            other => other,
        }
    }

    /// Shape of a device operand, or an error naming the builder.
    pub(crate) fn data_shape(&self, op: &str) -> Result<&'a Shape> {
        self.shape()
            .ok_or_else(|| Error::msg(format!("{op} requires an array or expression operand")))
    }
}

/// Conversion into a builder operand.
pub trait IntoInput<'a, B: Backend> {
    fn into_input(self) -> Input<'a, B>;
}

impl<'a, B: Backend> IntoInput<'a, B> for Input<'a, B> {
    fn into_input(self) -> Input<'a, B> {
        self
    }
}

impl<'a, B: Backend> IntoInput<'a, B> for &'a Array<B> {
    fn into_input(self) -> Input<'a, B> {
        Input::Array(self)
    }
}

impl<'a, B: Backend> IntoInput<'a, B> for &'a ExpressionTree<B> {
    fn into_input(self) -> Input<'a, B> {
        Input::Tree(self)
    }
}

impl<'a, B: Backend> IntoInput<'a, B> for HostValue {
    fn into_input(self) -> Input<'a, B> {
        Input::Value(self)
    }
}

impl<'a, B: Backend> IntoInput<'a, B> for LoopIndex {
    fn into_input(self) -> Input<'a, B> {
        Input::Index(self)
    }
}

macro_rules! impl_literal_input {
    ($($ty:ty),*) => {
        $(
            impl<'a, B: Backend> IntoInput<'a, B> for $ty {
                fn into_input(self) -> Input<'a, B> {
                    Input::Value(HostValue::from(self))
                }
            }
        )*
    };
}

impl_literal_input!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
