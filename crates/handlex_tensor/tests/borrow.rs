mod utils;

use handlex_core::{
    error::{Error, Result},
    memory_format::MemoryFormat,
};
use handlex_tensor::{borrow_from_optional_tensor, MaybeOwned, Tensor};
use utils::{setup_tensor, setup_tensor_with_shape};

#[test]
fn borrow_leaves_the_count_alone() -> Result<()> {
    let tensor = setup_tensor(vec![1.0, 2.0, 3.0])?;
    {
        let borrowed = tensor.borrow();
        assert_eq!(tensor.use_count(), 1);
        assert!(borrowed.is_same(&tensor));
        assert_eq!(borrowed.sizes(), &[3]);

        let copy = borrowed.clone();
        assert_eq!(tensor.use_count(), 1);
        drop(copy);
    }
    assert_eq!(tensor.use_count(), 1);
    Ok(())
}

#[test]
fn borrow_of_undefined_is_undefined() -> Result<()> {
    let tensor = Tensor::default();
    let borrowed = tensor.borrow();
    assert!(!borrowed.is_defined());
    Ok(())
}

#[test]
fn reassign_points_at_another_handle() -> Result<()> {
    let a = setup_tensor(vec![1.0])?;
    let b = setup_tensor(vec![2.0])?;
    let mut borrowed = a.borrow();
    borrowed.reassign(&b);
    assert!(borrowed.is_same(&b));
    assert_eq!(a.use_count(), 1);
    assert_eq!(b.use_count(), 1);
    Ok(())
}

#[test]
fn to_tensor_takes_a_real_reference() -> Result<()> {
    let tensor = setup_tensor(vec![1.0, 2.0])?;
    let owned = tensor.borrow().to_tensor();
    assert_eq!(tensor.use_count(), 2);
    drop(owned);
    assert_eq!(tensor.use_count(), 1);
    Ok(())
}

#[test]
fn optional_borrow() -> Result<()> {
    let tensor = setup_tensor(vec![1.0])?;

    let some = borrow_from_optional_tensor(Some(&tensor));
    assert!(some.is_borrowed());
    assert!(some.is_same(&tensor));
    assert_eq!(tensor.use_count(), 1);

    let none = borrow_from_optional_tensor(None);
    assert!(!none.is_borrowed());
    assert!(!none.is_defined());
    Ok(())
}

#[test]
fn expect_contiguous_borrows_when_already_contiguous() -> Result<()> {
    let tensor = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false)?;
    let result = tensor.try_expect_contiguous(MemoryFormat::Contiguous)?;
    assert!(result.is_borrowed());
    assert!(result.is_same(&tensor));
    assert_eq!(tensor.use_count(), 1);
    Ok(())
}

#[test]
fn expect_contiguous_copies_a_transposed_tensor() -> Result<()> {
    let tensor = setup_tensor_with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false)?;
    let transposed = tensor.try_transpose(0, 1)?;
    assert!(!transposed.is_contiguous());

    let result = transposed.try_expect_contiguous(MemoryFormat::Contiguous)?;
    assert!(matches!(result, MaybeOwned::Owned(_)));
    assert!(result.is_contiguous());
    assert!(!result.is_alias_of(&tensor));
    assert_eq!(result.to_flatten_vec::<f32>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    let owned = result.into_owned();
    assert_eq!(owned.sizes(), &[3, 2]);
    Ok(())
}

#[test]
fn expect_contiguous_in_channels_last() -> Result<()> {
    let tensor = Tensor::try_ones(&[2, 3, 4, 5])?;
    let result = tensor.try_expect_contiguous(MemoryFormat::ChannelsLast)?;
    assert!(!result.is_borrowed());
    assert_eq!(result.strides(), &[60, 1, 15, 3]);

    let again = result.try_expect_contiguous(MemoryFormat::ChannelsLast)?;
    assert!(again.is_borrowed());
    Ok(())
}

#[test]
fn expect_contiguous_rejects_preserve() -> Result<()> {
    let tensor = setup_tensor(vec![1.0])?;
    assert!(matches!(
        tensor.try_expect_contiguous(MemoryFormat::Preserve),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Tensor::default().try_expect_contiguous(MemoryFormat::Contiguous),
        Err(Error::UndefinedTensor)
    ));
    Ok(())
}
