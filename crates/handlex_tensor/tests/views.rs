mod utils;

use handlex_core::error::{Error, Result};
use handlex_tensor::{autograd::BackwardOptions, GradMode, Tensor};
use std::sync::Arc;
use utils::{assert_close, setup_grad_tensor, setup_offset_view, setup_tensor, setup_tensor_with_shape};

#[test]
fn views_record_the_root_base() -> Result<()> {
    let x = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false)?;
    assert!(!x.is_view());
    assert!(matches!(x.try_base(), Err(Error::NotAView)));

    let narrowed = x.try_narrow(1, 1, 2)?;
    let transposed = narrowed.try_transpose(0, 1)?;
    assert!(narrowed.is_view());
    assert!(transposed.base().is_same(&x));
    assert!(narrowed.base().is_same(&x));
    assert!(transposed.is_alias_of(&x));
    assert_eq!(transposed.sizes(), &[2, 2]);
    assert_eq!(transposed.to_flatten_vec::<f32>(), vec![2.0, 5.0, 3.0, 6.0]);
    Ok(())
}

#[test]
fn view_geometry() -> Result<()> {
    let x = setup_tensor_with_shape((0..24).map(|v| v as f32).collect(), &[2, 3, 4], false)?;

    let permuted = x.try_permute(&[2, 0, 1])?;
    assert_eq!(permuted.sizes(), &[4, 2, 3]);
    assert_eq!(permuted.strides(), &[1, 12, 4]);

    let flat = x.try_view(&[6, 4])?;
    assert_eq!(flat.strides(), &[4, 1]);
    assert!(matches!(permuted.try_view(&[24]), Err(Error::IncompatibleShape(_))));

    let narrowed = x.try_narrow(-1, 1, 2)?;
    assert_eq!(narrowed.storage_offset(), 1);
    assert!(matches!(x.try_narrow(0, 1, 5), Err(Error::IndexOutOfBounds { index: 6, size: 2 })));
    assert!(matches!(x.try_transpose(0, 3), Err(Error::DimensionOutOfBounds { .. })));
    Ok(())
}

#[test]
fn writes_through_a_view_reach_the_base() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0, 3.0, 4.0])?;
    let v = x.try_narrow(0, 1, 2)?;
    v.add_(&Tensor::try_full(&[2], 10.0)?);
    assert_eq!(x.version(), 1);
    assert_eq!(v.version(), 1);
    assert_close(&x.to_flatten_vec::<f32>(), &[1.0, 12.0, 13.0, 4.0]);
    Ok(())
}

#[test]
fn offset_views_read_their_own_elements() -> Result<()> {
    let v = setup_offset_view(vec![1.0, 2.0, 3.0])?;
    assert_eq!(v.storage_offset(), 1);
    assert_close(&v.to_flatten_vec::<f32>(), &[1.0, 2.0, 3.0]);

    let doubled = v.try_add(&v)?;
    assert_eq!(doubled.storage_offset(), 0);
    assert_close(&doubled.to_flatten_vec::<f32>(), &[2.0, 4.0, 6.0]);
    Ok(())
}

#[test]
fn view_of_a_leaf_routes_gradient_to_the_base() -> Result<()> {
    let x = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], true)?;
    let v = x.try_transpose(0, 1)?;
    assert_eq!(v.grad_fn().map(|f| f.name()), Some("AsStridedBackward"));
    assert!(!v.is_leaf());

    v.try_mul_scalar(2.0)?.try_sum()?.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0; 6]);
    Ok(())
}

#[test]
fn overlapping_view_sums_its_gradient() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0])?;
    let windows = x.try_as_strided(&[2, 2], &[1, 1], 0)?;
    windows.try_sum()?.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[1.0, 2.0, 1.0]);
    Ok(())
}

#[test]
fn view_grad_fn_is_rederived_after_a_base_write() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0, 4.0])?;
    let y = x.try_mul_scalar(1.0)?;
    let v = y.try_narrow(0, 0, 2)?;

    let first = v.grad_fn().expect("view of a tracked base has a grad_fn");
    let again = v.grad_fn().expect("view of a tracked base has a grad_fn");
    assert!(Arc::ptr_eq(&first, &again));

    y.add_(&Tensor::try_ones(&[4])?);
    let after = v.grad_fn().expect("view of a tracked base has a grad_fn");
    assert!(!Arc::ptr_eq(&first, &after));
    assert_eq!(after.name(), "AsStridedBackward");
    Ok(())
}

#[test]
fn in_place_add_on_a_view_flows_into_the_base() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0, 4.0])?;
    let w = setup_grad_tensor(vec![1.0, 1.0])?;
    let y = x.try_mul_scalar(2.0)?;
    let v = y.try_narrow(0, 1, 2)?;

    v.add_(&w);
    assert_eq!(y.grad_fn().map(|f| f.name()), Some("CopySlices"));
    assert_eq!(v.grad_fn().map(|f| f.name()), Some("AsStridedBackward"));
    assert_close(&y.to_flatten_vec::<f32>(), &[2.0, 5.0, 7.0, 8.0]);

    y.try_sum()?.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0, 2.0, 2.0]);
    assert_close(&w.grad().to_flatten_vec::<f32>(), &[1.0, 1.0]);
    Ok(())
}

#[test]
fn in_place_copy_on_a_view_cuts_the_overwritten_gradient() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0, 4.0])?;
    let src = setup_grad_tensor(vec![5.0, 6.0])?;
    let y = x.try_mul_scalar(1.0)?;

    y.try_narrow(0, 0, 2)?.copy_(&src);
    assert_close(&y.to_flatten_vec::<f32>(), &[5.0, 6.0, 3.0, 4.0]);

    y.try_sum()?.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[0.0, 0.0, 1.0, 1.0]);
    assert_close(&src.grad().to_flatten_vec::<f32>(), &[1.0, 1.0]);
    Ok(())
}

#[test]
fn non_differentiable_views() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let y = x.try_mul_scalar(1.0)?;
    let v = y.try_narrow_with(GradMode::DISABLED, 0, 0, 1)?;
    assert!(v.is_view());
    assert!(v.is_leaf());
    assert!(!v.requires_grad());

    // a view of it stays non-differentiable
    let vv = v.try_view(&[1])?;
    assert!(vv.is_leaf());

    assert!(matches!(v.try_add_(&Tensor::try_ones(&[1])?), Err(Error::RequiresGrad(_))));
    Ok(())
}
