// Integration tests for arrays, views and host/device transfers
//
// These tests run against the host backend and check that views alias their
// parent's storage, that strided arrays round-trip through the staged copy
// path, and that scalars convert on read and write.

use tessera::prelude::*;
use tessera::{
    copy_to_device, copy_to_host, evaluate, read_bytes, render, write_bytes, AxisIndex, Backend, Error,
};

fn matrix(rows: &[Vec<f32>], ctx: &HostContext) -> HostArray {
    HostArray::from_slice_2d(rows, ctx).unwrap()
}

// Construction and transfers

#[test]
fn test_from_slice_is_column_major() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let m = matrix(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], &ctx);
    assert_eq!(m.dims(), &[2, 3]);
    assert_eq!(m.to_vec::<f32>()?, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    Ok(())
}

#[test]
fn test_from_slice_rejects_wrong_count() {
    let ctx = HostContext::new();
    let err = HostArray::from_slice(&[1i32, 2, 3], (2, 2), &ctx).unwrap_err();
    assert!(matches!(err, Error::ElementCountMismatch { expected: 4, got: 3, .. }));
}

#[test]
fn test_copy_rejects_wrong_dtype() {
    let ctx = HostContext::new();
    let a = HostArray::new(3, DType::F64, &ctx).unwrap();
    let err = copy_to_device(&[1.0f32, 2.0, 3.0], &a).unwrap_err();
    assert!(matches!(err, Error::DTypeMismatch { .. }));
}

#[test]
fn test_staged_write_into_strided_view() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let m = HostArray::from_slice(&[0i32; 12], (3, 4), &ctx)?;
    // Every other column: a non-contiguous view.
    let cols = m.slice2(.., Slice::all().step_by(2))?;
    assert!(!cols.is_contiguous());
    copy_to_device(&[1i32, 2, 3, 4, 5, 6], &cols)?;
    assert_eq!(
        m.to_vec::<i32>()?,
        vec![1, 2, 3, 0, 0, 0, 4, 5, 6, 0, 0, 0]
    );
    Ok(())
}

#[test]
fn test_staged_read_from_strided_view() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let data: Vec<u16> = (0..12).collect();
    let m = HostArray::from_slice(&data, (3, 4), &ctx)?;
    let inner = m.slice2(1..3, 1..3)?;
    let mut out = [0u16; 4];
    copy_to_host(&inner, &mut out)?;
    assert_eq!(out, [4, 5, 7, 8]);
    Ok(())
}

#[test]
fn test_non_blocking_staged_write() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::from_slice(&[0u8; 6], 6, &ctx)?;
    let odd = a.slice(Slice::range(1, 6).step_by(2))?;
    let queue = HostBackend::queue(&ctx, 0)?;
    write_bytes(&queue, &[7, 8, 9], &odd, false)?;
    assert_eq!(a.to_vec::<u8>()?, vec![0, 7, 0, 8, 0, 9]);
    Ok(())
}

#[test]
fn test_staged_transfers_on_second_queue() -> tessera::Result<()> {
    let ctx = HostContext::with_queues(2);
    let m = HostArray::from_slice(&[0i32; 6], (2, 3), &ctx)?;
    let top = m.slice2(0, ..)?;
    let queue = HostBackend::queue(&ctx, 1)?;
    write_bytes(&queue, &[1i32, 2, 3].map(i32::to_ne_bytes).concat(), &top, false)?;
    assert_eq!(m.to_vec::<i32>()?, vec![1, 0, 2, 0, 3, 0]);

    let mut out = [0u8; 12];
    read_bytes(&queue, &top, &mut out, false)?;
    assert_eq!(out.to_vec(), [1i32, 2, 3].map(i32::to_ne_bytes).concat());
    Ok(())
}

#[test]
fn test_empty_transfer_is_noop() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let e = HostArray::new((0, 3), DType::F32, &ctx)?;
    copy_to_device::<_, f32>(&[], &e)?;
    assert!(e.to_vec::<f32>()?.is_empty());
    Ok(())
}

// Views

#[test]
fn test_slice_compound_assign_aliases_parent() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::from_slice(&[1.0f32, 2.0, 3.0, 4.0], 4, &ctx)?;
    let middle = a.slice(1..3)?;
    assert!(middle.is_view());
    assert!(middle.same_buffer(&a));
    middle.assign_mul(10.0f32)?;
    assert_eq!(a.to_vec::<f32>()?, vec![1.0, 20.0, 30.0, 4.0]);
    Ok(())
}

#[test]
fn test_integer_slice_scaled_in_place() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::from_slice(&[1i32, 2, 3, 4], 4, &ctx)?;
    let view = a.slice(1..3)?;
    view.assign(&mul(&view, 10i32)?)?;
    assert_eq!(a.to_vec::<i32>()?, vec![1, 20, 30, 4]);
    Ok(())
}

#[test]
fn test_rank_zero_array_takes_literals() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::new((), DType::I32, &ctx)?;
    assert_eq!(a.rank(), 0);
    a.assign(5i32)?;
    a.assign_add(2i32)?;
    assert_eq!(a.to_vec::<i32>()?, vec![7]);

    let f = HostArray::from_slice(&[1.5f32], (), &ctx)?;
    assert_eq!(evaluate(&add(&f, 1.0f32)?)?.data, vec![2.5]);
    Ok(())
}

#[test]
fn test_row_and_column_views() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let m = matrix(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], &ctx);
    let second_row = m.slice2(1, ..)?;
    assert_eq!(second_row.dims(), &[2]);
    assert_eq!(second_row.to_vec::<f32>()?, vec![3.0, 4.0]);

    let first_col = m.slice2(.., 0)?;
    first_col.assign(0.0f32)?;
    assert_eq!(m.to_vec::<f32>()?, vec![0.0, 0.0, 0.0, 2.0, 4.0, 6.0]);
    Ok(())
}

#[test]
fn test_single_element_view_has_shape_one() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let m = matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]], &ctx);
    let v = m.slice2(AxisIndex::Single(1), AxisIndex::Single(0))?;
    assert_eq!(v.dims(), &[1]);
    assert_eq!(v.to_vec::<f32>()?, vec![3.0]);
    Ok(())
}

#[test]
fn test_diag_views() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let data: Vec<i64> = (0..9).collect();
    // [[0, 3, 6], [1, 4, 7], [2, 5, 8]]
    let m = HostArray::from_slice(&data, (3, 3), &ctx)?;
    assert_eq!(m.diag(0)?.to_vec::<i64>()?, vec![0, 4, 8]);
    assert_eq!(m.diag(1)?.to_vec::<i64>()?, vec![3, 7]);
    assert_eq!(m.diag(-2)?.to_vec::<i64>()?, vec![2]);

    m.diag(0)?.assign(-1i64)?;
    assert_eq!(m.to_vec::<i64>()?, vec![-1, 1, 2, 3, -1, 5, 6, 7, -1]);
    Ok(())
}

#[test]
fn test_out_of_bounds_index() {
    let ctx = HostContext::new();
    let a = HostArray::new(3, DType::I8, &ctx).unwrap();
    assert!(matches!(
        a.at(3).unwrap_err(),
        Error::IndexOutOfBounds { axis: 0, index: 3, size: 3 }
    ));
    let m = HostArray::new((2, 2), DType::I8, &ctx).unwrap();
    assert!(matches!(m.at(0).unwrap_err(), Error::DimensionMismatch { .. }));
}

#[test]
fn test_deep_copy_detaches() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::from_slice(&[1u32, 2, 3], 3, &ctx)?;
    let b = a.deep_copy()?;
    assert!(!b.same_buffer(&a));
    b.assign_add(1u32)?;
    assert_eq!(a.to_vec::<u32>()?, vec![1, 2, 3]);
    assert_eq!(b.to_vec::<u32>()?, vec![2, 3, 4]);
    Ok(())
}

#[test]
fn test_assign_into_empty_is_noop() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let e = HostArray::new((3, 0), DType::F32, &ctx)?;
    e.assign(1.0f32)?;
    e.assign_add(1.0f32)?;
    Ok(())
}

// Scalars

#[test]
fn test_scalar_set_and_cast() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let i = Scalar::<HostBackend>::zeroed(DType::I32, &ctx)?;
    i.set(5i32)?;
    assert_eq!(i.cast::<i32>()?, 5);

    let f = Scalar::<HostBackend>::new(0.0f32, &ctx)?;
    f.set(5i32)?;
    assert_eq!(f.cast::<i32>()?, 5);
    assert_eq!(f.value()?, HostValue::F32(5.0));
    Ok(())
}

#[test]
fn test_scalar_view_writes_through() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let a = HostArray::from_slice(&[1i16, 2, 3], 3, &ctx)?;
    let s = a.at(2)?;
    s.set(30i16)?;
    assert_eq!(a.to_vec::<i16>()?, vec![1, 2, 30]);

    let m = matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]], &ctx);
    assert_eq!(m.at2(0, 1)?.cast::<f64>()?, 2.0);
    Ok(())
}

#[test]
fn test_scalar_cast_out_of_range_fails() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let s = Scalar::<HostBackend>::new(-1i32, &ctx)?;
    assert!(s.cast::<u8>().is_err());
    Ok(())
}

// Rendering

#[test]
fn test_render_matrix_and_view() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let m = HostArray::from_slice_2d(&[vec![1i32, 2], vec![3, 4]], &ctx)?;
    assert_eq!(render(&m)?, "[[1,2],\n[3,4]]");
    assert_eq!(m.diag(0)?.to_string(), "[1,4]");
    Ok(())
}

#[test]
fn test_render_truncates_long_vector() -> tessera::Result<()> {
    let ctx = HostContext::new();
    let data: Vec<i32> = (0..100).collect();
    let v = HostArray::from_slice(&data, 100, &ctx)?;
    assert_eq!(v.to_string(), "[0,1,2,...,97,98,99]");
    Ok(())
}
