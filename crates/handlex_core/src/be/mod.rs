pub mod ops;

use crate::{buffer::Buffer, device::Device, error::Error, error::Result};

fn ensure_host(buffers: &[&dyn Buffer]) -> Result<()> {
    for buffer in buffers {
        if buffer.device() != Device::CPU {
            return Err(Error::InvalidDevice(format!(
                "kernels are only available on CPU, got {}",
                buffer.device().name()
            )));
        }
    }
    Ok(())
}

fn metadata_ptr(metadata: Option<&[usize]>) -> *const usize {
    metadata.map_or(std::ptr::null(), |d| d.as_ptr())
}
