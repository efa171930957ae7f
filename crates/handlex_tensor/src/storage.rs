use handlex_core::{
    buffer::{Buffer, BufferManager},
    device::Device,
    dtype::DType,
    error::{Error, Result},
};
use std::{
    ffi::c_void,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

struct StorageInner {
    buffer: RwLock<Box<dyn Buffer>>,
    len: usize,
    dtype: DType,
    device: Device,
}

/// Shared, lock-protected element buffer.
///
/// Cloning a `Storage` shares the same buffer; views and detached aliases all hold
/// clones of their base's storage.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl Storage {
    pub fn new(buffer: Box<dyn Buffer>) -> Self {
        let (len, dtype, device) = (buffer.len(), buffer.dtype(), buffer.device());
        Self {
            inner: Arc::new(StorageInner {
                buffer: RwLock::new(buffer),
                len,
                dtype,
                device,
            }),
        }
    }

    /// Allocates `len` zeroed elements.
    pub fn allocate(len: usize, device: Device, dtype: DType) -> Result<Self> {
        Ok(Self::new(BufferManager::create(len, device, dtype)?))
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> Device {
        self.inner.device
    }

    pub fn nbytes(&self) -> usize {
        self.inner.len * self.inner.dtype.size_in_bytes()
    }

    pub fn is_same(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of `Storage` handles sharing this buffer.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Box<dyn Buffer>>> {
        self.inner.buffer.read().map_err(|_| Error::Lock)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Box<dyn Buffer>>> {
        self.inner.buffer.write().map_err(|_| Error::Lock)
    }

    /// Address of element 0. The buffer is never reallocated, so the pointer stays
    /// valid for as long as any clone of this storage is alive.
    pub fn data_ptr(&self) -> Result<*const c_void> {
        Ok(self.read()?.as_ptr())
    }

    pub fn mutable_data_ptr(&self) -> Result<*mut c_void> {
        Ok(self.write()?.as_mut_ptr())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("len", &self.inner.len)
            .field("dtype", &self.inner.dtype)
            .field("device", &self.inner.device)
            .finish()
    }
}
