use crate::{
    buffer::Buffer,
    device::Device,
    dtype::DType,
    error::{Error, Result},
};
use std::{ffi::c_void, ptr};

/// Host buffer backed by 8-byte words so every supported dtype is aligned.
pub struct CpuBuffer {
    data: Vec<u64>,
    len: usize,
    dtype: DType,
}

impl CpuBuffer {
    pub fn new(size: usize, dtype: DType) -> Result<Self> {
        let total_size = size
            .checked_mul(dtype.size_in_bytes())
            .ok_or_else(|| Error::InvalidArgument("Overflow in allocation".into()))?;
        let words = total_size.div_ceil(8);
        let mut data = Vec::new();
        data.try_reserve_exact(words).map_err(|_| Error::OutOfMemory)?;
        data.resize(words, 0);
        Ok(Self { data, len: size, dtype })
    }

    fn size_in_bytes(&self) -> usize {
        self.len * self.dtype.size_in_bytes()
    }

    fn check_range(&self, offset_bytes: usize, size_in_bytes: usize, what: &str) -> Result<()> {
        if offset_bytes + size_in_bytes > self.size_in_bytes() {
            return Err(Error::InvalidArgument(format!(
                "Size mismatch in {}: requested {} bytes at {}, available {}",
                what,
                size_in_bytes,
                offset_bytes,
                self.size_in_bytes()
            )));
        }
        Ok(())
    }
}

impl Buffer for CpuBuffer {
    fn as_ptr(&self) -> *const c_void {
        self.data.as_ptr() as *const _
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.data.as_mut_ptr() as *mut _
    }

    fn len(&self) -> usize {
        self.len
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn device(&self) -> Device {
        Device::CPU
    }

    unsafe fn copy_from(&mut self, other: &dyn Buffer, src_offset: usize, dst_offset: usize, count: usize) -> Result<()> {
        if self.dtype() != other.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: other.dtype(),
            });
        }
        if other.device() != Device::CPU {
            return Err(Error::DeviceMismatch {
                expected: Device::CPU,
                got: other.device(),
            });
        }
        if src_offset + count > other.len() || dst_offset + count > self.len() {
            return Err(Error::InvalidArgument("Offset and count exceed buffer dimensions".into()));
        }
        let elem = self.dtype.size_in_bytes();
        ptr::copy_nonoverlapping(
            (other.as_ptr() as *const u8).add(src_offset * elem),
            (self.as_mut_ptr() as *mut u8).add(dst_offset * elem),
            count * elem,
        );
        Ok(())
    }

    unsafe fn copy_from_host(&mut self, src: *const c_void, size_in_bytes: usize, src_offset: usize, dst_offset: usize) -> Result<()> {
        let elem = self.dtype.size_in_bytes();
        self.check_range(dst_offset * elem, size_in_bytes, "copy_from_host")?;
        ptr::copy_nonoverlapping(
            (src as *const u8).add(src_offset * elem),
            (self.as_mut_ptr() as *mut u8).add(dst_offset * elem),
            size_in_bytes,
        );
        Ok(())
    }

    unsafe fn copy_to_host(&self, dest: *mut c_void, size_in_bytes: usize, src_offset: usize, dst_offset: usize) -> Result<()> {
        let elem = self.dtype.size_in_bytes();
        self.check_range(src_offset * elem, size_in_bytes, "copy_to_host")?;
        ptr::copy_nonoverlapping(
            (self.as_ptr() as *const u8).add(src_offset * elem),
            (dest as *mut u8).add(dst_offset * elem),
            size_in_bytes,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_round_trip_with_offsets() {
        let mut buf = CpuBuffer::new(4, DType::F32).unwrap();
        let src = [1.0f32, 2.0, 3.0];
        unsafe {
            buf.copy_from_host(src.as_ptr() as *const c_void, 8, 1, 2).unwrap();
        }
        let mut out = [0.0f32; 4];
        unsafe {
            buf.copy_to_host(out.as_mut_ptr() as *mut c_void, 16, 0, 0).unwrap();
        }
        assert_eq!(out, [0.0, 0.0, 2.0, 3.0]);
        assert_eq!(buf.as_ptr() as usize % std::mem::align_of::<f64>(), 0);
    }

    #[test]
    fn out_of_range_copy_is_rejected() {
        let mut buf = CpuBuffer::new(2, DType::F64).unwrap();
        let src = [1.0f64; 3];
        let res = unsafe { buf.copy_from_host(src.as_ptr() as *const c_void, 24, 0, 0) };
        assert!(res.is_err());
    }
}
