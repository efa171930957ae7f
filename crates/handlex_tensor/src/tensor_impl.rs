use crate::{autograd::AutogradMeta, options::TensorOptions, storage::Storage, Tensor};
use handlex_core::{
    device::Device,
    dtype::DType,
    error::{Error, Result},
    layout::Layout,
    tags::{AtomicTagSet, LayoutKind, Tag, TagSet},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

/// Mutation counter shared by a tensor, its views and its detached aliases.
#[derive(Debug, Clone, Default)]
pub struct VersionCounter(Arc<AtomicU64>);

impl VersionCounter {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Back-reference from a view to the tensor that owns its storage.
pub(crate) struct ViewMeta {
    /// Always the root base, never another view.
    pub(crate) base: Tensor,
    /// Views created while history recording was off never derive a grad_fn.
    pub(crate) differentiable: bool,
}

/// The heap object a [`Tensor`] handle points at.
pub struct TensorImpl {
    storage: Option<Storage>,
    layout: Layout,
    dtype: DType,
    device: Device,
    layout_kind: LayoutKind,
    tags: AtomicTagSet,
    version: VersionCounter,
    view: Option<ViewMeta>,
    autograd: Mutex<Option<AutogradMeta>>,
}

fn derive_tags(device: Device, layout_kind: LayoutKind, dtype: DType, has_storage: bool, inference: bool) -> TagSet {
    let mut tags = TagSet::EMPTY;
    tags.insert(match device {
        Device::CPU => Tag::Cpu,
        Device::CUDA(_) => Tag::Cuda,
        Device::MPS => Tag::Mps,
        Device::Meta => Tag::Meta,
    });
    tags.insert(layout_kind.tag());
    if dtype.is_float() {
        tags.insert(Tag::Floating);
    } else if dtype.is_int() {
        tags.insert(Tag::Integral);
    } else {
        tags.insert(Tag::Boolean);
    }
    if !has_storage {
        tags.insert(Tag::NoStorage);
    }
    if inference {
        tags.insert(Tag::Inference);
    }
    tags
}

impl TensorImpl {
    /// Binds externally provided storage to a layout.
    ///
    /// The layout must address only elements inside the storage, and any dtype or
    /// device fixed in `options` must agree with the storage.
    pub fn new(storage: Storage, layout: Layout, options: TensorOptions) -> Result<Self> {
        if let Some(dtype) = options.explicit_dtype() {
            if dtype != storage.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: dtype,
                    got: storage.dtype(),
                });
            }
        }
        if let Some(device) = options.explicit_device() {
            if device != storage.device() {
                return Err(Error::DeviceMismatch {
                    expected: device,
                    got: storage.device(),
                });
            }
        }
        let extent = layout.storage_extent();
        if extent > storage.len() {
            return Err(Error::InvalidArgument(format!(
                "layout addresses {} elements but storage holds {}",
                extent,
                storage.len()
            )));
        }

        let (dtype, device) = (storage.dtype(), storage.device());
        let tags = derive_tags(device, options.get_layout_kind(), dtype, true, options.is_inference());
        let tensor_impl = Self {
            storage: Some(storage),
            layout,
            dtype,
            device,
            layout_kind: options.get_layout_kind(),
            tags: AtomicTagSet::new(tags),
            version: VersionCounter::default(),
            view: None,
            autograd: Mutex::new(None),
        };
        tensor_impl.apply_requires_grad(options)?;
        Ok(tensor_impl)
    }

    /// Metadata-only tensor on the meta device.
    pub fn new_meta(layout: Layout, options: TensorOptions) -> Result<Self> {
        let dtype = options.resolved_dtype();
        let tags = derive_tags(Device::Meta, options.get_layout_kind(), dtype, false, options.is_inference());
        let tensor_impl = Self {
            storage: None,
            layout,
            dtype,
            device: Device::Meta,
            layout_kind: options.get_layout_kind(),
            tags: AtomicTagSet::new(tags),
            version: VersionCounter::default(),
            view: None,
            autograd: Mutex::new(None),
        };
        tensor_impl.apply_requires_grad(options)?;
        Ok(tensor_impl)
    }

    /// A new impl over `source`'s storage and version counter.
    ///
    /// `view` is `Some((base, differentiable))` for views; `None` produces a plain alias
    /// such as the result of `detach`.
    pub(crate) fn new_alias(source: &TensorImpl, layout: Layout, view: Option<(Tensor, bool)>) -> Result<Self> {
        if let Some(storage) = &source.storage {
            let extent = layout.storage_extent();
            if extent > storage.len() {
                return Err(Error::InvalidArgument(format!(
                    "view addresses {} elements but storage holds {}",
                    extent,
                    storage.len()
                )));
            }
        }
        Ok(Self {
            storage: source.storage.clone(),
            layout,
            dtype: source.dtype,
            device: source.device,
            layout_kind: source.layout_kind,
            tags: source.tags.clone(),
            version: source.version.clone(),
            view: view.map(|(base, differentiable)| ViewMeta { base, differentiable }),
            autograd: Mutex::new(None),
        })
    }

    fn apply_requires_grad(&self, options: TensorOptions) -> Result<()> {
        if !options.get_requires_grad() {
            return Ok(());
        }
        if !self.dtype.is_float() {
            return Err(Error::RequiresGrad(format!(
                "only tensors of floating point dtype can require gradients, got {}",
                self.dtype.as_str()
            )));
        }
        let mut guard = self.autograd()?;
        guard.get_or_insert_with(AutogradMeta::default).requires_grad = true;
        Ok(())
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn layout_kind(&self) -> LayoutKind {
        self.layout_kind
    }

    pub fn tags(&self) -> TagSet {
        self.tags.load()
    }

    pub(crate) fn set_tag(&self, tag: Tag, on: bool) {
        self.tags.set(tag, on);
    }

    pub fn version_counter(&self) -> &VersionCounter {
        &self.version
    }

    pub(crate) fn view_meta(&self) -> Option<&ViewMeta> {
        self.view.as_ref()
    }

    pub(crate) fn autograd(&self) -> Result<MutexGuard<'_, Option<AutogradMeta>>> {
        self.autograd.lock().map_err(|_| Error::Lock)
    }
}

impl std::fmt::Debug for TensorImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorImpl")
            .field("shape", &self.layout.shape())
            .field("strides", &self.layout.strides())
            .field("offset", &self.layout.offset())
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .field("layout_kind", &self.layout_kind)
            .field("is_view", &self.view.is_some())
            .finish()
    }
}
