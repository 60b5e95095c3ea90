use std::ops::Deref;

use crate::array::Array;
use crate::backend::{Backend, CommandQueue};
use crate::dtype::{DType, HostValue, WithDType};
use crate::error::{Error, Result};
use crate::expr::{ExpressionTree, Input, IntoInput};

// Scalar — A one-element array with blocking host access
//
// A Scalar is either a fresh one-element allocation or a view onto a single
// element of a larger array (`a.at(i)`, `m.at2(i, j)`). Reads and writes go
// straight through the default command queue and block until complete.

/// A one-element array.
#[derive(Clone)]
pub struct Scalar<B: Backend>(Array<B>);

impl<B: Backend> std::fmt::Debug for Scalar<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scalar({:?})", self.0)
    }
}

impl<B: Backend> Deref for Scalar<B> {
    type Target = Array<B>;

    fn deref(&self) -> &Array<B> {
        &self.0
    }
}

impl<B: Backend> Scalar<B> {
    /// Allocate a scalar holding `value`.
    pub fn new<T: WithDType>(value: T, context: &B::Context) -> Result<Self> {
        let scalar = Scalar(Array::new(1, T::DTYPE, context)?);
        scalar.set(value.into_host_value())?;
        Ok(scalar)
    }

    /// Allocate a scalar of `dtype` holding zero.
    pub fn zeroed(dtype: DType, context: &B::Context) -> Result<Self> {
        let scalar = Scalar(Array::new(1, dtype, context)?);
        scalar.set(HostValue::from_f64(dtype, 0.0))?;
        Ok(scalar)
    }

    /// Evaluate a one-element expression into a fresh scalar.
    pub fn from_tree(tree: &ExpressionTree<B>) -> Result<Self> {
        Self::from_view(Array::from_tree(tree)?)
    }

    /// Wrap a one-element array (typically a view).
    pub(crate) fn from_view(array: Array<B>) -> Result<Self> {
        if array.elem_count() != 1 {
            return Err(Error::ElementCountMismatch {
                shape: array.shape().clone(),
                expected: 1,
                got: array.elem_count(),
            });
        }
        Ok(Scalar(array))
    }

    fn byte_range(&self) -> (usize, usize) {
        let size = self.dtype().size_in_bytes();
        (self.start() * size, size)
    }

    /// Blocking read of the element.
    pub fn value(&self) -> Result<HostValue> {
        let (offset, size) = self.byte_range();
        let mut bytes = vec![0u8; size];
        let queue = B::queue(self.context(), 0)?;
        queue.read(self.buffer(), true, offset, &mut bytes)?;
        Ok(HostValue::read_ne(self.dtype(), &bytes))
    }

    /// Blocking read converted to `T`. Fails if the value does not fit.
    pub fn cast<T: WithDType>(&self) -> Result<T> {
        self.value()?.cast::<T>()
    }

    /// Blocking write. The value is converted to the scalar's dtype.
    pub fn set(&self, value: impl Into<HostValue>) -> Result<()> {
        let value = value.into();
        let value = if value.dtype() == self.dtype() {
            value
        } else {
            HostValue::from_f64(self.dtype(), value.to_f64())
        };
        let (offset, size) = self.byte_range();
        let mut bytes = vec![0u8; size];
        value.write_ne(&mut bytes);
        let queue = B::queue(self.context(), 0)?;
        queue.write(self.buffer(), true, offset, &bytes)
    }

    pub fn into_array(self) -> Array<B> {
        self.0
    }
}

impl<'a, B: Backend> IntoInput<'a, B> for &'a Scalar<B> {
    fn into_input(self) -> Input<'a, B> {
        Input::Array(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{array, TestBackend, TestContext};

    #[test]
    fn test_set_and_cast() {
        let ctx = TestContext::new();
        let s = Scalar::<TestBackend>::zeroed(DType::I32, &ctx).unwrap();
        assert_eq!(s.value().unwrap(), HostValue::I32(0));
        s.set(5i32).unwrap();
        assert_eq!(s.cast::<i32>().unwrap(), 5);
        assert_eq!(s.cast::<f64>().unwrap(), 5.0);
        s.set(7.9f64).unwrap();
        assert_eq!(s.value().unwrap(), HostValue::I32(7));
    }

    #[test]
    fn test_new_holds_value() {
        let ctx = TestContext::new();
        let s = Scalar::<TestBackend>::new(-3i8, &ctx).unwrap();
        assert_eq!(s.dtype(), DType::I8);
        assert_eq!(s.value().unwrap(), HostValue::I8(-3));
    }

    #[test]
    fn test_element_view_writes_through() {
        let ctx = TestContext::new();
        let v = array(&ctx, 4, DType::F32);
        let s = Scalar::<crate::testing::TestBackend>::new(0.0f32, &ctx).unwrap();
        assert_eq!(s.shape().dims(), &[1]);
        let e = v.at(2).unwrap();
        e.set(1.5f32).unwrap();
        assert_eq!(v.at(2).unwrap().cast::<f32>().unwrap(), 1.5);
    }

    #[test]
    fn test_from_view_rejects_larger_arrays() {
        let ctx = TestContext::new();
        let v = array(&ctx, 4, DType::F32);
        assert!(matches!(
            Scalar::from_view(v),
            Err(Error::ElementCountMismatch { expected: 1, got: 4, .. })
        ));
    }
}
