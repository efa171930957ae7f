#![allow(dead_code)]

use handlex_core::{device::auto_set_device, error::Result};
use handlex_tensor::Tensor;

/// An `f32` leaf from row-major data, optionally tracking gradients.
pub fn setup_tensor_with_shape(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Result<Tensor> {
    auto_set_device();

    let tensor = Tensor::try_from_flatten_vec(data, shape)?;
    if requires_grad {
        tensor.try_set_requires_grad(true)?;
    }
    Ok(tensor)
}

pub fn setup_grad_tensor(data: Vec<f32>) -> Result<Tensor> {
    let len = data.len();
    setup_tensor_with_shape(data, &[len], true)
}

pub fn setup_tensor(data: Vec<f32>) -> Result<Tensor> {
    let len = data.len();
    setup_tensor_with_shape(data, &[len], false)
}

/// `data` surrounded by padding, returned as a narrowed view
/// whose storage offset is not zero.
pub fn setup_offset_view(data: Vec<f32>) -> Result<Tensor> {
    auto_set_device();

    let len = data.len();
    let mut padded = Vec::with_capacity(len + 2);
    padded.push(0.0);
    padded.extend(data);
    padded.push(0.0);
    let tensor = Tensor::try_new(padded)?;
    tensor.try_narrow(0, 1, len)
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
    }
}
