use crate::{
    be::{ensure_host, metadata_ptr},
    buffer::Buffer,
    dtype::DType,
    error::{Error, Result},
};
#[allow(unused_imports)]
use half::{bf16, f16};
use handlex_cpu::ops::reduction::*;

#[macro_export]
macro_rules! declare_full_reduction_op {
    ($name:ident, [$($dtype:ident),* $(,)?]) => {
        paste::paste! {
            /// Reduces every element of `input` into `output[0]`.
            ///
            /// # Safety
            /// `metadata`, when given, must be `[dims, strides, offset]` and address only
            /// elements inside `input`. `output` must hold at least one element.
            pub unsafe fn $name(
                output: &mut dyn Buffer,
                input: &dyn Buffer,
                num_els: usize,
                num_dims: usize,
                metadata: Option<&[usize]>,
            ) -> Result<()> {
                if output.dtype() != input.dtype() {
                    return Err(Error::DTypeMismatch { expected: input.dtype(), got: output.dtype() });
                }
                if output.is_empty() {
                    return Err(Error::InvalidArgument("reduction output must hold one element".into()));
                }
                ensure_host(&[&*output, input])?;

                let metadata = metadata_ptr(metadata);
                match input.dtype() {
                    $(
                        DType::$dtype => [<$name _ $dtype:lower>](
                            num_els,
                            num_dims,
                            metadata,
                            input.as_ptr() as *const [<$dtype:lower>],
                            output.as_mut_ptr() as *mut [<$dtype:lower>],
                        ),
                    )*
                    #[allow(unreachable_patterns)]
                    _ => return Err(Error::UnsupportedDType),
                };

                Ok(())
            }
        }
    };
}

declare_full_reduction_op!(sum, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);
