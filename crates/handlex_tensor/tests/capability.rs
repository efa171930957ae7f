mod utils;

use handlex_core::{
    dtype::DType,
    error::{Error, Result},
    memory_format::MemoryFormat,
    tags::{LayoutKind, Tag},
};
use handlex_tensor::{Tensor, TensorOptions};
use utils::setup_tensor;

#[test]
fn dense_cpu_tags() -> Result<()> {
    let tensor = setup_tensor(vec![1.0, 2.0])?;
    assert!(tensor.is_cpu());
    assert!(!tensor.is_cuda());
    assert!(!tensor.is_mps());
    assert!(!tensor.is_meta());
    assert!(tensor.is_strided());
    assert!(!tensor.is_sparse());
    assert!(tensor.is_floating_point());
    assert!(tensor.is_signed());
    assert!(tensor.has_storage());
    assert!(!tensor.is_inference());
    assert_eq!(tensor.layout_kind(), LayoutKind::Strided);

    let tags = tensor.key_set();
    assert!(tags.contains(Tag::Cpu));
    assert!(tags.contains(Tag::Strided));
    assert!(tags.contains(Tag::Floating));
    assert!(!tags.contains(Tag::NoStorage));
    Ok(())
}

#[test]
fn integer_and_bool_tags() -> Result<()> {
    let ints = Tensor::try_new(vec![1u8, 2, 3])?;
    assert!(!ints.is_floating_point());
    assert!(!ints.is_signed());
    assert!(ints.key_set().contains(Tag::Integral));

    let flags = Tensor::try_new(vec![true, false])?;
    assert_eq!(flags.dtype(), DType::BOOL);
    assert!(flags.key_set().contains(Tag::Boolean));
    Ok(())
}

#[test]
fn meta_tensors_have_no_storage() -> Result<()> {
    let tensor = Tensor::try_empty_meta(&[2, 3])?;
    assert!(tensor.is_meta());
    assert!(!tensor.is_cpu());
    assert!(!tensor.has_storage());
    assert_eq!(tensor.nbytes(), 24);
    assert!(matches!(tensor.try_to_flatten_vec::<f32>(), Err(Error::NoStorage)));
    Ok(())
}

#[test]
fn sparse_tensors_refuse_nbytes() -> Result<()> {
    let tensor = Tensor::try_zeros_with_options(&[4], TensorOptions::new().layout_kind(LayoutKind::Sparse))?;
    assert!(tensor.is_sparse());
    assert!(!tensor.is_strided());
    assert!(matches!(
        tensor.try_nbytes(),
        Err(Error::UnsupportedLayout {
            op: "nbytes",
            layout: LayoutKind::Sparse
        })
    ));
    assert!(matches!(tensor.try_view(&[2, 2]), Err(Error::UnsupportedLayout { .. })));
    Ok(())
}

#[test]
fn nbytes_counts_logical_elements() -> Result<()> {
    let tensor = Tensor::try_zeros_with_spec(&[4, 4], handlex_core::device::Device::CPU, DType::F64)?;
    assert_eq!(tensor.try_nbytes()?, 128);

    let narrowed = tensor.try_narrow(0, 1, 2)?;
    assert_eq!(narrowed.try_nbytes()?, 64);
    Ok(())
}

#[test]
fn inference_and_conj_bits() -> Result<()> {
    let tensor = Tensor::try_ones_with_options(&[2], TensorOptions::new().inference(true))?;
    assert!(tensor.is_inference());

    assert!(!tensor.is_conj());
    tensor.set_conj(true);
    assert!(tensor.is_conj());
    assert!(tensor.clone().is_conj());
    tensor.set_conj(false);
    assert!(!tensor.is_conj());
    Ok(())
}

#[test]
fn suggest_memory_format() -> Result<()> {
    let nchw = Tensor::try_ones(&[2, 3, 4, 5])?;
    assert_eq!(nchw.suggest_memory_format(false), MemoryFormat::Contiguous);

    let nhwc = nchw.try_contiguous_with_format(MemoryFormat::ChannelsLast)?;
    assert_eq!(nhwc.strides(), &[60, 1, 15, 3]);
    assert_eq!(nhwc.suggest_memory_format(false), MemoryFormat::ChannelsLast);
    assert_eq!(nhwc.suggest_memory_format(true), MemoryFormat::ChannelsLast);
    assert!(nhwc.is_contiguous_memory_format(MemoryFormat::ChannelsLast));
    assert!(!nhwc.is_contiguous());

    let ndhwc = Tensor::try_ones(&[2, 3, 4, 5, 6])?.try_contiguous_with_format(MemoryFormat::ChannelsLast3d)?;
    assert_eq!(ndhwc.suggest_memory_format(true), MemoryFormat::ChannelsLast3d);
    Ok(())
}

#[test]
fn non_strided_tensors_suggest_contiguous() -> Result<()> {
    let tensor = Tensor::try_empty_with_options(&[2, 3, 4, 5], TensorOptions::new().layout_kind(LayoutKind::Mkldnn))?;
    assert!(tensor.is_mkldnn());
    assert_eq!(tensor.suggest_memory_format(false), MemoryFormat::Contiguous);
    Ok(())
}
