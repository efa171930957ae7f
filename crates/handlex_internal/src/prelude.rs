pub use crate::core::{
    device::{get_default_device, set_default_device, Device},
    dtype::*,
    error::{Error, Result},
    memory_format::MemoryFormat,
    tags::LayoutKind,
};
pub use crate::tensor::{
    autograd::{enter_dual_level, exit_dual_level, BackwardOptions},
    borrow_from_optional_tensor, BorrowedTensor, GradMode, MaybeOwned, Tensor, TensorOptions,
};
pub use crate::{bf16, f16};
