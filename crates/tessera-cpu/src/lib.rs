// Host Backend — reference implementation of the Tessera device interface
//
// This crate implements the Backend trait entirely in host memory. It is the
// backend the test suites run against and a readable statement of what a
// real device runtime must do with the trees the front end hands it.
//
// ARCHITECTURE:
// - HostContext is a cheap, clonable identity; arrays from two different
//   contexts can never meet in one expression.
// - HostBuffer is a byte vector behind a RwLock, sized at allocation.
// - HostQueue performs transfers synchronously; the blocking flag only
//   changes ordering guarantees on real devices, so it is accepted and ignored.
// - execute() hands the tree to the interpreter in `interpreter.rs`.
//
// USAGE:
//   let ctx = HostContext::new();
//   let a = Array::<HostBackend>::from_slice(&[1.0f32, 2.0, 3.0], 3, &ctx)?;
//   a.assign_mul(10.0f32)?;

mod interpreter;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tessera_core::backend::{Backend, BackendBuffer, BackendContext, CommandQueue};
use tessera_core::bail;
use tessera_core::error::{Error, Result};
use tessera_core::execute::ExecutionConfig;
use tessera_core::expr::ExpressionTree;

pub use interpreter::{evaluate, Dense};

// HostContext

/// A host "device". Every context is distinct; clones compare equal.
#[derive(Clone, PartialEq, Eq)]
pub struct HostContext {
    id: usize,
    queues: usize,
}

impl HostContext {
    /// A new context with a single command queue.
    pub fn new() -> Self {
        Self::with_queues(1)
    }

    /// A new context with `queues` command queues (at least one).
    pub fn with_queues(queues: usize) -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        HostContext {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            queues: queues.max(1),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn queue_count(&self) -> usize {
        self.queues
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostContext({})", self.id)
    }
}

impl BackendContext for HostContext {
    fn name(&self) -> String {
        format!("host:{}", self.id)
    }
}

// HostBuffer

/// A zero-initialized byte allocation in host memory.
pub struct HostBuffer {
    data: RwLock<Vec<u8>>,
}

impl HostBuffer {
    fn new(size_in_bytes: usize) -> Self {
        HostBuffer {
            data: RwLock::new(vec![0; size_in_bytes]),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.data
            .read()
            .map_err(|_| Error::msg("host buffer lock poisoned"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.data
            .write()
            .map_err(|_| Error::msg("host buffer lock poisoned"))
    }
}

impl BackendBuffer for HostBuffer {
    fn size_in_bytes(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }
}

fn check_range(buffer_len: usize, offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > buffer_len) {
        return Err(Error::msg(format!(
            "transfer of {len} bytes at offset {offset} overruns a {buffer_len}-byte buffer"
        )));
    }
    Ok(())
}

// HostQueue

/// An in-order command queue. Every command completes before it returns.
#[derive(Debug, Clone, Copy)]
pub struct HostQueue {
    index: usize,
}

impl CommandQueue for HostQueue {
    type Buffer = HostBuffer;

    fn write(&self, buffer: &HostBuffer, _blocking: bool, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = buffer.write()?;
        check_range(bytes.len(), offset, data.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: &HostBuffer, _blocking: bool, offset: usize, out: &mut [u8]) -> Result<()> {
        let bytes = buffer.read()?;
        check_range(bytes.len(), offset, out.len())?;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn index(&self) -> usize {
        self.index
    }
}

// HostBackend

/// The host-memory backend.
#[derive(Debug, Clone, Copy)]
pub struct HostBackend;

impl Backend for HostBackend {
    type Context = HostContext;
    type Buffer = HostBuffer;
    type Queue = HostQueue;

    fn allocate(_context: &HostContext, size_in_bytes: usize) -> Result<HostBuffer> {
        Ok(HostBuffer::new(size_in_bytes))
    }

    fn queue(context: &HostContext, index: usize) -> Result<HostQueue> {
        if index >= context.queues {
            bail!(
                "{} has {} command queue(s), queue {index} requested",
                context.name(),
                context.queues
            );
        }
        Ok(HostQueue { index })
    }

    fn execute(tree: &ExpressionTree<Self>, config: &ExecutionConfig) -> Result<()> {
        Self::queue(
            tree.context().ok_or_else(|| Error::msg("expression has no device context"))?,
            config.queue,
        )?;
        interpreter::run(tree)
    }
}

/// Convenience type alias for arrays on the host backend.
pub type HostArray = tessera_core::Array<HostBackend>;
