#![cfg(feature = "serde")]

mod utils;

use handlex_core::{
    device::Device,
    dtype::DType,
    error::{Error, Result},
};
use handlex_tensor::Tensor;
use utils::{assert_close, setup_grad_tensor, setup_offset_view, setup_tensor_with_shape};

#[test]
fn bytes_round_trip_keeps_geometry() -> Result<()> {
    let view = setup_offset_view(vec![1.0, 2.0, 3.0])?;
    let bytes = view.to_bytes()?;
    let restored = Tensor::from_bytes(&bytes)?;

    assert_eq!(restored.sizes(), view.sizes());
    assert_eq!(restored.strides(), view.strides());
    assert_eq!(restored.storage_offset(), 1);
    assert!(!restored.is_view());
    assert!(!restored.is_alias_of(&view));
    assert_close(&restored.to_flatten_vec::<f32>(), &[1.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn json_round_trip() -> Result<()> {
    let x = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false)?;
    let transposed = x.try_transpose(0, 1)?;
    let json = transposed.to_json()?;
    let restored = Tensor::from_json(&json)?;

    assert_eq!(restored.sizes(), &[3, 2]);
    assert_eq!(restored.strides(), &[1, 3]);
    assert_eq!(restored.dtype(), DType::F32);
    assert_eq!(restored.device(), Device::CPU);
    assert_close(&restored.to_flatten_vec::<f32>(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    Ok(())
}

#[test]
fn leaf_tracking_survives_but_history_does_not() -> Result<()> {
    let x = setup_grad_tensor(vec![1.0, 2.0])?;
    let restored = Tensor::from_bytes(&x.to_bytes()?)?;
    assert!(restored.requires_grad());
    assert!(restored.is_leaf());

    let y = x.try_mul_scalar(2.0)?;
    let restored = Tensor::from_bytes(&y.to_bytes()?)?;
    assert!(!restored.requires_grad());
    assert_close(&restored.to_flatten_vec::<f32>(), &[2.0, 4.0]);
    Ok(())
}

#[test]
fn meta_tensors_carry_no_data() -> Result<()> {
    let meta = Tensor::try_empty_meta(&[4, 4])?;
    let restored = Tensor::from_json(&meta.to_json()?)?;
    assert!(restored.is_meta());
    assert!(!restored.has_storage());
    assert_eq!(restored.sizes(), &[4, 4]);
    Ok(())
}

#[test]
fn malformed_input_is_rejected() -> Result<()> {
    assert!(matches!(Tensor::from_bytes(&[1, 2, 3]), Err(Error::DeserializationError(_))));
    assert!(matches!(Tensor::from_json("{}"), Err(Error::DeserializationError(_))));
    assert!(matches!(Tensor::default().to_bytes(), Err(Error::SerializationError(_))));
    Ok(())
}
