use log::debug;

use crate::array::Array;
use crate::backend::{Backend, CommandQueue};
use crate::dtype::{HostValue, WithDType};
use crate::error::{Error, Result};
use crate::execute::ExecutionConfig;

// Copy — Host ↔ device transfer protocol
//
// Only arrays whose elements occupy one gap-free, zero-offset, column-major
// run of the buffer can be moved in a single transfer. Everything else goes
// through a contiguous staging array and one device-side assignment:
//
//   write:  host ──transfer──▶ staging ──assign──▶ strided destination
//   read:   strided source ──assign──▶ staging ──transfer──▶ host
//
// Host data is always in column-major logical order. The blocking flag is
// forwarded to the transfer; the staging assignment runs on the same queue
// and relies on it executing in order. A non-blocking staged transfer drains
// the queue before the staging array is released.

fn check_len<B: Backend>(array: &Array<B>, bytes: usize) -> Result<()> {
    let size = array.dtype().size_in_bytes();
    let expected = array.elem_count() * size;
    if bytes != expected {
        return Err(Error::ElementCountMismatch {
            shape: array.shape().clone(),
            expected: array.elem_count(),
            got: bytes / size,
        });
    }
    Ok(())
}

fn check_dtype<B: Backend, T: WithDType>(array: &Array<B>) -> Result<()> {
    if array.dtype() != T::DTYPE {
        return Err(Error::DTypeMismatch {
            expected: array.dtype(),
            got: T::DTYPE,
        });
    }
    Ok(())
}

fn on_queue<Q: CommandQueue>(queue: &Q) -> ExecutionConfig {
    ExecutionConfig::default().with_queue(queue.index())
}

/// Write raw native-endian element bytes into `dst` through `queue`.
pub fn write_bytes<B: Backend>(
    queue: &B::Queue,
    data: &[u8],
    dst: &Array<B>,
    blocking: bool,
) -> Result<()> {
    check_len(dst, data.len())?;
    if dst.elem_count() == 0 {
        return Ok(());
    }
    if dst.is_contiguous() {
        return queue.write(dst.buffer(), blocking, 0, data);
    }
    debug!(
        "staged write of {} bytes into strided array {} (strides {:?}, start {})",
        data.len(),
        dst.shape(),
        dst.strides(),
        dst.start()
    );
    let staging = Array::new(dst.shape().clone(), dst.dtype(), dst.context())?;
    queue.write(staging.buffer(), blocking, 0, data)?;
    dst.assign_with(&staging, &on_queue(queue))?;
    // `staging` is released on return.
    if !blocking {
        queue.finish()?;
    }
    Ok(())
}

/// Read the elements of `src` as raw native-endian bytes through `queue`.
pub fn read_bytes<B: Backend>(
    queue: &B::Queue,
    src: &Array<B>,
    out: &mut [u8],
    blocking: bool,
) -> Result<()> {
    check_len(src, out.len())?;
    if src.elem_count() == 0 {
        return Ok(());
    }
    if src.is_contiguous() {
        return queue.read(src.buffer(), blocking, 0, out);
    }
    debug!(
        "staged read of {} bytes from strided array {} (strides {:?}, start {})",
        out.len(),
        src.shape(),
        src.strides(),
        src.start()
    );
    let staging = Array::new(src.shape().clone(), src.dtype(), src.context())?;
    staging.assign_with(src, &on_queue(queue))?;
    queue.read(staging.buffer(), blocking, 0, out)?;
    if !blocking {
        queue.finish()?;
    }
    Ok(())
}

/// Blocking copy of host data (column-major order) into `dst`.
pub fn copy_to_device<B: Backend, T: WithDType>(src: &[T], dst: &Array<B>) -> Result<()> {
    check_dtype::<B, T>(dst)?;
    let size = dst.dtype().size_in_bytes();
    let mut bytes = vec![0u8; src.len() * size];
    for (value, chunk) in src.iter().zip(bytes.chunks_exact_mut(size)) {
        value.write_ne(chunk);
    }
    let queue = B::queue(dst.context(), 0)?;
    write_bytes(&queue, &bytes, dst, true)
}

/// Blocking copy of `src` into host memory (column-major order).
pub fn copy_to_host<B: Backend, T: WithDType>(src: &Array<B>, dst: &mut [T]) -> Result<()> {
    check_dtype::<B, T>(src)?;
    let size = src.dtype().size_in_bytes();
    let mut bytes = vec![0u8; dst.len() * size];
    let queue = B::queue(src.context(), 0)?;
    read_bytes(&queue, src, &mut bytes, true)?;
    for (value, chunk) in dst.iter_mut().zip(bytes.chunks_exact(size)) {
        *value = T::read_ne(chunk);
    }
    Ok(())
}

impl<B: Backend> Array<B> {
    /// Copy the elements to a host vector (column-major order).
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        let mut out = vec![T::from_f64(0.0); self.elem_count()];
        copy_to_host(self, &mut out)?;
        Ok(out)
    }

    /// Copy the elements to the host as tagged values, whatever the dtype.
    pub fn to_host_values(&self) -> Result<Vec<HostValue>> {
        let dtype = self.dtype();
        let size = dtype.size_in_bytes();
        let mut bytes = vec![0u8; self.elem_count() * size];
        let queue = B::queue(self.context(), 0)?;
        read_bytes(&queue, self, &mut bytes, true)?;
        Ok(bytes
            .chunks_exact(size)
            .map(|chunk| HostValue::read_ne(dtype, chunk))
            .collect())
    }
}
