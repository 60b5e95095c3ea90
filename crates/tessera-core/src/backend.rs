use std::fmt;

use crate::error::Result;
use crate::execute::ExecutionConfig;
use crate::expr::ExpressionTree;

// Backend — The narrow interface between the array front end and a device
//
// The front end never computes anything itself. It needs exactly three things
// from the world below it:
//
//   1. Buffers: raw byte allocations bound to a context.
//   2. Command queues: blocking or non-blocking byte-range reads and writes
//      at a byte offset into a buffer.
//   3. An execution interface: hand over an expression tree plus options and
//      have it evaluated (kernel generation, tuning and dispatch all live
//      behind this call).
//
// Keeping this a trait with associated types means a GPU runtime and the host
// reference backend in `tessera-cpu` plug in without touching tessera-core,
// and Array<B> stays monomorphic over its device.

/// A device context: every buffer and every array is bound to exactly one.
/// Arrays from different contexts can never meet in one expression.
pub trait BackendContext: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// A human-readable name for this context (e.g., "host:0").
    fn name(&self) -> String;
}

/// A raw device allocation. Its contents are only reachable through a
/// [`CommandQueue`] or through expression execution.
pub trait BackendBuffer: Send + Sync + 'static {
    /// Size of the allocation in bytes.
    fn size_in_bytes(&self) -> usize;
}

/// A command queue that moves bytes between host memory and device buffers.
///
/// `offset` is in bytes. A non-blocking call may return before the transfer
/// has retired on the device; [`CommandQueue::finish`] waits for everything
/// enqueued so far.
pub trait CommandQueue: Send + Sync {
    type Buffer: BackendBuffer;

    /// Copy `data` into `buffer` starting at byte `offset`.
    fn write(&self, buffer: &Self::Buffer, blocking: bool, offset: usize, data: &[u8])
        -> Result<()>;

    /// Copy `out.len()` bytes from `buffer` starting at byte `offset` into `out`.
    fn read(&self, buffer: &Self::Buffer, blocking: bool, offset: usize, out: &mut [u8])
        -> Result<()>;

    /// Block until every command enqueued on this queue has completed.
    fn finish(&self) -> Result<()>;

    /// Position of this queue within its context.
    fn index(&self) -> usize;
}

/// The main Backend trait. Implementing it for a marker struct (e.g.
/// `HostBackend`) makes that struct a complete device for Tessera.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The context type for this backend.
    type Context: BackendContext;
    /// The buffer type for this backend.
    type Buffer: BackendBuffer;
    /// The command-queue type for this backend.
    type Queue: CommandQueue<Buffer = Self::Buffer>;

    /// Allocate `size_in_bytes` bytes on `context`. Contents are unspecified.
    fn allocate(context: &Self::Context, size_in_bytes: usize) -> Result<Self::Buffer>;

    /// The command queue at `index` of `context` (0 is the default queue).
    fn queue(context: &Self::Context, index: usize) -> Result<Self::Queue>;

    /// Evaluate an expression tree. This is the only call through which the
    /// front end causes device-side computation.
    fn execute(tree: &ExpressionTree<Self>, config: &ExecutionConfig) -> Result<()>;
}
