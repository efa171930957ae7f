#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a tensor's storage lives.
///
/// Only [`Device::CPU`] has a built-in buffer implementation. The other kinds are
/// still valid tags so that externally provided buffers can be wrapped, and
/// [`Device::Meta`] marks tensors that carry metadata but no storage at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Device {
    CPU,
    CUDA(usize),
    MPS,
    Meta,
}

impl Device {
    pub fn name(&self) -> String {
        match self {
            Device::CPU => "CPU".to_string(),
            Device::CUDA(id) => format!("CUDA Device {}", id),
            Device::MPS => "MPS".to_string(),
            Device::Meta => "Meta".to_string(),
        }
    }
}

thread_local! {
    static DEFAULT_DEVICE: std::cell::Cell<Device> = const { std::cell::Cell::new(Device::CPU) };
}

pub fn get_default_device() -> Device {
    DEFAULT_DEVICE.with(|d| d.get())
}

pub fn set_default_device(device: Device) {
    DEFAULT_DEVICE.with(|d| d.set(device));
}

pub fn auto_set_device() {
    set_default_device(Device::CPU);
}
