pub mod cpu;

use crate::{
    device::Device,
    dtype::DType,
    error::{Error, Result},
};
use cpu::CpuBuffer;
use std::ffi::c_void;

pub struct BufferManager {}

impl BufferManager {
    /// Allocates a zero-filled buffer of `size` elements.
    pub fn create(size: usize, device: Device, dtype: DType) -> Result<Box<dyn Buffer>> {
        let buffer: Box<dyn Buffer> = match device {
            Device::CPU => Box::new(CpuBuffer::new(size, dtype)?),
            Device::Meta => {
                return Err(Error::InvalidDevice("meta tensors do not own a buffer".into()));
            },
            other => {
                return Err(Error::InvalidDevice(format!(
                    "no buffer implementation is available for {}",
                    other.name()
                )));
            },
        };

        Ok(buffer)
    }
}

pub trait Buffer: Send + Sync {
    fn as_ptr(&self) -> *const c_void;
    fn as_mut_ptr(&mut self) -> *mut c_void;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn dtype(&self) -> DType;
    fn device(&self) -> Device;

    /// Copies `count` elements from `other[src_offset..]` into `self[dst_offset..]`.
    ///
    /// # Safety
    /// Requires matching dtypes and no memory overlap between the two ranges
    unsafe fn copy_from(&mut self, other: &dyn Buffer, src_offset: usize, dst_offset: usize, count: usize) -> Result<()>;

    /// # Safety
    /// Requires valid source pointer and matching size_in_bytes with no memory overlap
    unsafe fn copy_from_host(&mut self, src: *const c_void, size_in_bytes: usize, src_offset: usize, dst_offset: usize) -> Result<()>;

    /// # Safety
    /// Requires valid destination pointer and matching size_in_bytes with no memory overlap
    unsafe fn copy_to_host(&self, dest: *mut c_void, size_in_bytes: usize, src_offset: usize, dst_offset: usize) -> Result<()>;
}
