pub mod prelude;

pub use handlex_core as core;
pub use handlex_tensor as tensor;

pub use ::half::{bf16, f16};
pub use handlex_core::dtype::{bfloat16, bool, float16, float32, float64, half, int32, int64, int8, uint32, uint8};
