//! In-memory backend used by the unit tests of this crate. It stores bytes
//! and serves transfers but refuses to execute expressions; execution is
//! covered by `tessera-cpu` and the facade's integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::array::Array;
use crate::backend::{Backend, BackendBuffer, BackendContext, CommandQueue};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::execute::ExecutionConfig;
use crate::expr::ExpressionTree;
use crate::shape::Shape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContext(usize);

impl TestContext {
    pub fn new() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        TestContext(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl BackendContext for TestContext {
    fn name(&self) -> String {
        format!("test:{}", self.0)
    }
}

pub struct TestBuffer(RwLock<Vec<u8>>);

impl BackendBuffer for TestBuffer {
    fn size_in_bytes(&self) -> usize {
        self.0.read().map(|b| b.len()).unwrap_or(0)
    }
}

pub struct TestQueue(usize);

impl CommandQueue for TestQueue {
    type Buffer = TestBuffer;

    fn write(&self, buffer: &TestBuffer, _: bool, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = buffer.0.write().map_err(|_| Error::msg("poisoned"))?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: &TestBuffer, _: bool, offset: usize, out: &mut [u8]) -> Result<()> {
        let bytes = buffer.0.read().map_err(|_| Error::msg("poisoned"))?;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }

    fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TestBackend;

impl Backend for TestBackend {
    type Context = TestContext;
    type Buffer = TestBuffer;
    type Queue = TestQueue;

    fn allocate(_: &TestContext, size_in_bytes: usize) -> Result<TestBuffer> {
        Ok(TestBuffer(RwLock::new(vec![0; size_in_bytes])))
    }

    fn queue(_: &TestContext, index: usize) -> Result<TestQueue> {
        Ok(TestQueue(index))
    }

    fn execute(_: &ExpressionTree<Self>, config: &ExecutionConfig) -> Result<()> {
        Err(Error::Unsupported(format!(
            "the test backend does not execute (queue {})",
            config.queue
        )))
    }
}

pub fn array(ctx: &TestContext, shape: impl Into<Shape>, dtype: DType) -> Array<TestBackend> {
    Array::new(shape, dtype, ctx).unwrap()
}
