mod utils;

use handlex_core::error::{Error, Result};
use handlex_tensor::{autograd::BackwardOptions, GradMode, Tensor, TensorOptions};
use utils::{assert_close, setup_grad_tensor, setup_tensor, setup_tensor_with_shape};

#[test]
fn requires_grad_flag() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0])?;
    assert!(!x.requires_grad());
    assert!(x.is_leaf());
    assert!(x.grad_fn().is_none());

    x.set_requires_grad(true);
    assert!(x.requires_grad());
    x.set_requires_grad(true);
    assert!(x.requires_grad());
    assert!(x.is_leaf());
    Ok(())
}

#[test]
fn requires_grad_from_options() -> Result<()> {
    let x = Tensor::try_ones_with_options(&[3], TensorOptions::new().requires_grad(true))?;
    assert!(x.requires_grad());
    assert!(x.is_leaf());
    Ok(())
}

#[test]
fn integer_tensors_cannot_require_grad() -> Result<()> {
    let x = Tensor::try_new(vec![1i32, 2, 3])?;
    assert!(matches!(x.try_set_requires_grad(true), Err(Error::RequiresGrad(_))));
    assert!(!x.requires_grad());
    Ok(())
}

#[test]
fn computed_tensors_track_history() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let y = x.try_mul_scalar(3.0)?;
    assert!(y.requires_grad());
    assert!(!y.is_leaf());
    assert_eq!(y.grad_fn().map(|f| f.name()), Some("MulScalarBackward"));
    assert_eq!(y.output_nr(), 0);

    assert!(matches!(y.try_set_requires_grad(false), Err(Error::RequiresGrad(_))));
    assert!(y.requires_grad());

    let untracked = x.try_mul_scalar_with(GradMode::DISABLED, 3.0)?;
    assert!(!untracked.requires_grad());
    assert!(untracked.is_leaf());
    Ok(())
}

#[test]
fn untracked_inputs_record_nothing() -> Result<()> {
    let a = setup_tensor(vec![1.0, 2.0])?;
    let b = setup_tensor(vec![3.0, 4.0])?;
    let c = a.try_mul(&b)?;
    assert!(!c.requires_grad());
    assert!(c.grad_fn().is_none());
    assert_eq!(c.to_flatten_vec::<f32>(), vec![3.0, 8.0]);
    Ok(())
}

#[test]
fn gradients_accumulate_across_passes() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0, 3.0])?;
    let loss = x.try_mul_scalar(3.0)?.try_sum()?;

    loss.try_backward(BackwardOptions::new().retain_graph(true))?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[3.0, 3.0, 3.0]);

    loss.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[6.0, 6.0, 6.0]);

    x.reset_grad();
    assert!(!x.grad().is_defined());
    Ok(())
}

#[test]
fn turning_tracking_off_keeps_the_gradient() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    x.try_mul_scalar(2.0)?.try_sum()?.try_backward(BackwardOptions::new())?;
    x.set_requires_grad(false);
    assert!(!x.requires_grad());
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0]);
    Ok(())
}

#[test]
fn accumulate_grad_steals_unique_gradients() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let incoming = Tensor::try_ones(&[2])?;
    let ptr = incoming.impl_ptr();

    x.try_accumulate_grad(incoming)?;
    assert_eq!(x.grad().impl_ptr(), ptr);

    x.try_accumulate_grad(Tensor::try_ones(&[2])?)?;
    assert_eq!(x.grad().impl_ptr(), ptr);
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0]);
    Ok(())
}

#[test]
fn accumulate_grad_copies_shared_gradients() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let shared = Tensor::try_ones(&[2])?;

    x.try_accumulate_grad(shared.clone())?;
    assert!(!x.grad().is_same(&shared));
    x.try_accumulate_grad(shared.clone())?;
    assert_close(&shared.to_flatten_vec::<f32>(), &[1.0, 1.0]);
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0]);
    Ok(())
}

#[test]
fn accumulate_grad_checks_before_writing() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    x.try_accumulate_grad(Tensor::try_ones(&[2])?)?;

    let result = x.try_accumulate_grad(Tensor::try_ones(&[3])?);
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    assert!(matches!(x.try_accumulate_grad(Tensor::default()), Err(Error::InvalidArgument(_))));
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[1.0, 1.0]);
    Ok(())
}

#[test]
fn accumulate_grad_needs_tracking() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0])?;
    let result = x.try_accumulate_grad(Tensor::try_ones(&[2])?);
    assert!(matches!(result, Err(Error::RequiresGrad(_))));
    assert!(!x.grad().is_defined());
    Ok(())
}

#[test]
fn frozen_gradient_is_not_accumulated() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    x.try_accumulate_grad(Tensor::try_ones(&[2])?)?;
    x.set_requires_grad(false);

    let result = x.try_accumulate_grad(Tensor::try_ones(&[2])?);
    assert!(matches!(result, Err(Error::RequiresGrad(_))));
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[1.0, 1.0]);

    x.set_requires_grad(true);
    x.try_accumulate_grad(Tensor::try_ones(&[2])?)?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0]);
    Ok(())
}

#[test]
fn grad_layout_follows_the_tensor() -> Result<()> {
    let x = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false)?;
    let xt = x.try_transpose(0, 1)?.try_clone_tensor()?;
    assert_eq!(xt.strides(), &[1, 3]);
    xt.set_requires_grad(true);

    xt.try_accumulate_grad(Tensor::try_ones(&[3, 2])?)?;
    assert_eq!(xt.grad().strides(), xt.strides());
    Ok(())
}

#[test]
fn set_grad_and_mutable_access() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0])?;
    assert!(matches!(x.try_set_grad(Tensor::try_ones(&[5])?), Err(Error::DimensionMismatch { .. })));

    x.set_grad(Tensor::try_full(&[2], 4.0)?);
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[4.0, 4.0]);

    x.with_mutable_grad(|grad| grad.reset());
    assert!(!x.grad().is_defined());
    Ok(())
}

#[test]
fn detach_shares_storage_and_version() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let d = x.detach();
    assert!(d.is_alias_of(&x));
    assert!(!d.requires_grad());
    assert!(!d.is_view());
    assert_eq!(x.version(), 0);

    d.add_(&Tensor::try_ones(&[2])?);
    assert_eq!(x.version(), 1);
    assert_close(&x.to_flatten_vec::<f32>(), &[2.0, 3.0]);
    Ok(())
}

#[test]
fn detach_in_place() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let y = x.try_mul_scalar(2.0)?;
    y.detach_();
    assert!(y.is_leaf());
    assert!(!y.requires_grad());

    let v = x.try_narrow(0, 0, 1)?;
    assert!(matches!(v.try_detach_(), Err(Error::RequiresGrad(_))));
    Ok(())
}

#[test]
fn in_place_on_a_leaf_requiring_grad_is_rejected() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let result = x.try_add_(&Tensor::try_ones(&[2])?);
    assert!(matches!(result, Err(Error::RequiresGrad(_))));
    assert_eq!(x.version(), 0);
    assert_close(&x.to_flatten_vec::<f32>(), &[1.0, 2.0]);

    let v = x.try_narrow(0, 0, 1)?;
    assert!(matches!(v.try_copy_(&Tensor::try_zeros(&[1])?), Err(Error::RequiresGrad(_))));

    x.try_add_inplace_with(GradMode::DISABLED, &Tensor::try_ones(&[2])?)?;
    assert_eq!(x.version(), 1);
    assert!(x.is_leaf());
    Ok(())
}

#[test]
fn in_place_on_a_non_leaf_rebases_history() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let w = setup_grad_tensor(vec![5.0, 6.0])?;
    let y = x.try_mul_scalar(2.0)?;
    y.add_(&w);
    assert_eq!(y.grad_fn().map(|f| f.name()), Some("AddBackward"));
    assert_close(&y.to_flatten_vec::<f32>(), &[7.0, 10.0]);

    y.try_sum()?.try_backward(BackwardOptions::new())?;
    assert_close(&x.grad().to_flatten_vec::<f32>(), &[2.0, 2.0]);
    assert_close(&w.grad().to_flatten_vec::<f32>(), &[1.0, 1.0]);
    Ok(())
}

#[test]
fn in_place_with_an_aliased_source() -> Result<()> {
    let x = setup_tensor(vec![1.0, 2.0, 3.0, 4.0])?;
    let alias = x.try_as_strided(&[4], &[1], 0)?;
    x.add_(&alias);
    assert_close(&x.to_flatten_vec::<f32>(), &[2.0, 4.0, 6.0, 8.0]);
    Ok(())
}
