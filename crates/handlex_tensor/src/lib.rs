pub mod adapter;
pub mod autograd;
mod borrow;
mod capability;
mod creation;
mod ops;
pub mod options;
#[cfg(feature = "serde")]
pub mod serde;
pub mod storage;
pub mod tensor_impl;
mod utils;
mod vec;

pub use borrow::{borrow_from_optional_tensor, BorrowedTensor, MaybeOwned};
pub use options::{GradMode, TensorOptions};
pub use tensor_impl::TensorImpl;

use handlex_core::{
    device::Device,
    dtype::DType,
    error::{Error, Result},
    layout::Layout,
    memory_format::MemoryFormat,
    tags::TagSet,
};
use std::{
    ffi::c_void,
    sync::{Arc, Weak},
};

// ────────────────────────────────────────────────────────────────────────────
//  Handle
// ────────────────────────────────────────────────────────────────────────────

/// A reference-counted handle to a [`TensorImpl`].
///
/// A handle is either *empty* (the [`Default`] value) or *bound* to exactly one impl.
/// `clone` shares the impl and bumps its strong count, moves transfer ownership
/// without touching the count, and dropping the last bound handle frees the impl.
///
/// Accessors panic on an empty handle; use [`try_impl`](Self::try_impl) to probe.
#[derive(Clone, Default)]
pub struct Tensor {
    impl_: Option<Arc<TensorImpl>>,
}

/// Non-owning counterpart of [`Tensor`]; `upgrade` fails once the impl is gone.
#[derive(Clone, Default)]
pub struct WeakTensor {
    impl_: Weak<TensorImpl>,
}

impl WeakTensor {
    pub fn upgrade(&self) -> Option<Tensor> {
        self.impl_.upgrade().map(|impl_| Tensor { impl_: Some(impl_) })
    }

    pub fn expired(&self) -> bool {
        self.impl_.strong_count() == 0
    }
}

/// ## Handle lifecycle
///
/// * `wrap` / `from_impl` – bind a handle to an impl
/// * `reset` / `take` – release or move out, leaving an empty handle
/// * `is_defined`, `is_same`, `use_count`, `weak_use_count`, `downgrade` – identity and
///   diagnostics
///
/// The counts are diagnostics only. Another thread holding a clone may change them
/// between the read and any decision based on it.
impl Tensor {
    /// Binds a handle to an existing impl reference.
    ///
    /// # Panics
    ///
    /// * When `impl_` is `None`. An empty handle must be asked for explicitly with
    ///   [`Tensor::default`].
    pub fn wrap(impl_: Option<Arc<TensorImpl>>) -> Self {
        match impl_ {
            Some(impl_) => Self { impl_: Some(impl_) },
            None => panic!("TensorImpl with null reference is not supported; use Tensor::default() for an empty handle"),
        }
    }

    pub fn from_impl(tensor_impl: TensorImpl) -> Self {
        Self {
            impl_: Some(Arc::new(tensor_impl)),
        }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.impl_.is_some()
    }

    /// Drops this handle's reference. A no-op on an empty handle.
    pub fn reset(&mut self) {
        self.impl_ = None;
    }

    /// Moves the reference out, leaving `self` empty.
    pub fn take(&mut self) -> Tensor {
        std::mem::take(self)
    }

    /// True iff both handles are bound to the same impl. Two empty handles are not
    /// the same.
    pub fn is_same(&self, other: &Tensor) -> bool {
        match (&self.impl_, &other.impl_) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn use_count(&self) -> usize {
        self.impl_.as_ref().map_or(0, Arc::strong_count)
    }

    /// Number of live [`WeakTensor`]s pointing at the impl.
    pub fn weak_use_count(&self) -> usize {
        self.impl_.as_ref().map_or(0, Arc::weak_count)
    }

    pub fn downgrade(&self) -> WeakTensor {
        WeakTensor {
            impl_: self.impl_.as_ref().map_or_else(Weak::new, Arc::downgrade),
        }
    }

    pub fn try_impl(&self) -> Result<&TensorImpl> {
        self.impl_.as_deref().ok_or(Error::UndefinedTensor)
    }

    pub fn impl_arc(&self) -> Option<&Arc<TensorImpl>> {
        self.impl_.as_ref()
    }

    /// Address of the impl, or null for an empty handle.
    pub fn impl_ptr(&self) -> *const TensorImpl {
        self.impl_.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
    }

    #[inline]
    pub(crate) fn inner(&self) -> &TensorImpl {
        match self.impl_.as_deref() {
            Some(inner) => inner,
            None => panic!("null reference: tensor is undefined"),
        }
    }
}

/// ## Metadata accessors
///
/// O(1) reads delegated to the impl. All of them panic on an empty handle.
impl Tensor {
    pub fn dim(&self) -> usize {
        self.inner().layout().ndim()
    }

    pub fn ndim(&self) -> usize {
        self.dim()
    }

    pub fn sizes(&self) -> &[usize] {
        self.inner().layout().shape()
    }

    pub fn shape(&self) -> &[usize] {
        self.sizes()
    }

    pub fn strides(&self) -> &[usize] {
        self.inner().layout().strides()
    }

    pub fn layout(&self) -> &Layout {
        self.inner().layout()
    }

    pub fn storage_offset(&self) -> usize {
        self.inner().layout().offset()
    }

    pub fn numel(&self) -> usize {
        self.inner().layout().size()
    }

    pub fn itemsize(&self) -> usize {
        self.inner().dtype().size_in_bytes()
    }

    pub fn element_size(&self) -> usize {
        self.itemsize()
    }

    pub fn dtype(&self) -> DType {
        self.inner().dtype()
    }

    pub fn device(&self) -> Device {
        self.inner().device()
    }

    pub fn key_set(&self) -> TagSet {
        self.inner().tags()
    }

    /// Resolves a possibly negative dimension index.
    pub fn try_wrap_dim(&self, dim: i64) -> Result<usize> {
        let ndim = self.try_impl()?.layout().ndim();
        let wrapped = if dim < 0 { dim + ndim as i64 } else { dim };
        if wrapped < 0 || wrapped >= ndim as i64 {
            return Err(Error::DimensionOutOfBounds { dim, ndim });
        }
        Ok(wrapped as usize)
    }

    pub fn try_size(&self, dim: i64) -> Result<usize> {
        let d = self.try_wrap_dim(dim)?;
        Ok(self.sizes()[d])
    }

    pub fn size(&self, dim: i64) -> usize {
        self.try_size(dim).expect("failed to read size")
    }

    pub fn try_stride(&self, dim: i64) -> Result<usize> {
        let d = self.try_wrap_dim(dim)?;
        Ok(self.strides()[d])
    }

    pub fn stride(&self, dim: i64) -> usize {
        self.try_stride(dim).expect("failed to read stride")
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner().layout().is_contiguous()
    }

    pub fn is_contiguous_memory_format(&self, format: MemoryFormat) -> bool {
        self.inner().layout().is_contiguous_memory_format(format)
    }

    pub fn is_non_overlapping_and_dense(&self) -> bool {
        self.inner().layout().is_non_overlapping_and_dense()
    }

    /// Whether both tensors read from the same storage.
    pub fn is_alias_of(&self, other: &Tensor) -> bool {
        match (self.inner().storage(), other.inner().storage()) {
            (Some(a), Some(b)) => a.is_same(b),
            _ => false,
        }
    }

    /// Address of this tensor's first element, or null for a tensor without storage.
    ///
    /// Valid only while this handle (or another reference to the storage) is alive.
    pub fn try_data_ptr(&self) -> Result<*const c_void> {
        let inner = self.try_impl()?;
        match inner.storage() {
            Some(storage) => {
                let base = storage.data_ptr()? as *const u8;
                // SAFETY: the offset lies inside the storage; checked when the impl was built.
                Ok(unsafe { base.add(inner.layout().offset() * inner.dtype().size_in_bytes()) } as *const c_void)
            },
            None => Ok(std::ptr::null()),
        }
    }

    pub fn data_ptr(&self) -> *const c_void {
        self.try_data_ptr().expect("failed to get data pointer")
    }

    pub fn try_mutable_data_ptr(&self) -> Result<*mut c_void> {
        let inner = self.try_impl()?;
        match inner.storage() {
            Some(storage) => {
                let base = storage.mutable_data_ptr()? as *mut u8;
                // SAFETY: see `try_data_ptr`.
                Ok(unsafe { base.add(inner.layout().offset() * inner.dtype().size_in_bytes()) } as *mut c_void)
            },
            None => Ok(std::ptr::null_mut()),
        }
    }

    pub fn mutable_data_ptr(&self) -> *mut c_void {
        self.try_mutable_data_ptr().expect("failed to get mutable data pointer")
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.impl_ {
            Some(inner) => f
                .debug_struct("Tensor")
                .field("shape", &inner.layout().shape())
                .field("dtype", &inner.dtype())
                .field("device", &inner.device())
                .field("is_view", &inner.view_meta().is_some())
                .finish(),
            None => write!(f, "Tensor(undefined)"),
        }
    }
}
