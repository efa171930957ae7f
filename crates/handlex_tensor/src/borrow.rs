use crate::Tensor;
use handlex_core::{
    error::{Error, Result},
    memory_format::MemoryFormat,
};
use std::{fmt, marker::PhantomData, mem::ManuallyDrop, ops::Deref, ptr};

/// A [`Tensor`] alias that never touches the reference count.
///
/// Built by a bitwise copy of a live handle; dropping it skips the decrement. The
/// lifetime `'a` ties it to the handle it was made from, so the compiler rejects any
/// use after that handle is gone. Only shared access is exposed, so the alias can never
/// be reset, taken from or reassigned through `Deref`.
#[repr(transparent)]
pub struct BorrowedTensor<'a> {
    inner: ManuallyDrop<Tensor>,
    _marker: PhantomData<&'a Tensor>,
}

impl<'a> BorrowedTensor<'a> {
    pub fn new(tensor: &'a Tensor) -> Self {
        Self {
            // SAFETY: `tensor` outlives `'a` and the copy is never dropped, so the
            // shared count stays balanced.
            inner: ManuallyDrop::new(unsafe { ptr::read(tensor) }),
            _marker: PhantomData,
        }
    }

    /// Points this borrow at another handle. No count is incremented or decremented.
    pub fn reassign(&mut self, tensor: &'a Tensor) {
        // Overwriting a `ManuallyDrop` runs no destructor.
        self.inner = ManuallyDrop::new(unsafe { ptr::read(tensor) });
    }

    /// A real, counted handle to the same impl.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::clone(&self.inner)
    }
}

impl Clone for BorrowedTensor<'_> {
    fn clone(&self) -> Self {
        Self {
            // SAFETY: the copy carries the same lifetime as `self`.
            inner: ManuallyDrop::new(unsafe { ptr::read(&*self.inner) }),
            _marker: PhantomData,
        }
    }
}

impl Deref for BorrowedTensor<'_> {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        &self.inner
    }
}

impl fmt::Debug for BorrowedTensor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BorrowedTensor").field(&*self.inner).finish()
    }
}

/// Either a borrow of an existing handle or an owned handle, behind one `Deref`.
#[derive(Clone, Debug)]
pub enum MaybeOwned<'a> {
    Borrowed(BorrowedTensor<'a>),
    Owned(Tensor),
}

impl<'a> MaybeOwned<'a> {
    pub fn borrowed(tensor: &'a Tensor) -> Self {
        Self::Borrowed(BorrowedTensor::new(tensor))
    }

    pub fn owned(tensor: Tensor) -> Self {
        Self::Owned(tensor)
    }

    /// An owned empty handle.
    pub fn owned_default() -> Self {
        Self::Owned(Tensor::default())
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed(_))
    }

    pub fn into_owned(self) -> Tensor {
        match self {
            Self::Borrowed(b) => b.to_tensor(),
            Self::Owned(t) => t,
        }
    }
}

impl Deref for MaybeOwned<'_> {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        match self {
            Self::Borrowed(b) => &**b,
            Self::Owned(t) => t,
        }
    }
}

/// Borrows `tensor` when present, otherwise yields an owned empty handle.
pub fn borrow_from_optional_tensor(tensor: Option<&Tensor>) -> MaybeOwned<'_> {
    match tensor {
        Some(t) => MaybeOwned::borrowed(t),
        None => MaybeOwned::owned_default(),
    }
}

/// ## Borrowing
///
/// * `borrow` – zero-count alias of this handle
/// * `expect_contiguous` – borrow when already laid out as requested, otherwise an
///   owned copy in that layout
impl Tensor {
    pub fn borrow(&self) -> BorrowedTensor<'_> {
        BorrowedTensor::new(self)
    }

    /// Runs [`try_expect_contiguous`](Self::try_expect_contiguous) and panics on failure.
    pub fn expect_contiguous(&self, format: MemoryFormat) -> MaybeOwned<'_> {
        self.try_expect_contiguous(format).expect("failed to make tensor contiguous")
    }

    /// Returns a borrow of `self` if it is already contiguous in `format`, or an owned
    /// copy laid out in `format` otherwise.
    ///
    /// # Errors
    ///
    /// * [`Error::UndefinedTensor`] on an empty handle
    /// * [`Error::InvalidArgument`] for [`MemoryFormat::Preserve`], which names no layout
    pub fn try_expect_contiguous(&self, format: MemoryFormat) -> Result<MaybeOwned<'_>> {
        let inner = self.try_impl()?;
        if format == MemoryFormat::Preserve {
            return Err(Error::InvalidArgument(
                "preserve memory format is unsupported by expect_contiguous".into(),
            ));
        }
        if inner.layout().is_contiguous_memory_format(format) {
            Ok(MaybeOwned::borrowed(self))
        } else {
            Ok(MaybeOwned::owned(self.try_contiguous_with_format(format)?))
        }
    }
}
