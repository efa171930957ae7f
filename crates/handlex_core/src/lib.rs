pub mod be;
pub mod buffer;
pub mod device;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod memory_format;
pub mod tags;

pub use handlex_cpu as cpu;
