use crate::{
    be::{ensure_host, metadata_ptr},
    buffer::Buffer,
    dtype::DType,
    error::{Error, Result},
};
#[allow(unused_imports)]
use half::{bf16, f16};
use handlex_cpu::ops::unary::*;

#[macro_export]
macro_rules! declare_unary_scalar_op {
    ($name:ident, [$($dtype:ident),* $(,)?]) => {
        paste::paste! {
            /// # Safety
            /// `metadata`, when given, must be `[dims, strides, offset]` and address only
            /// elements inside `input`. `output` holds `size` contiguous elements.
            pub unsafe fn $name(
                output: &mut dyn Buffer,
                input: &dyn Buffer,
                scalar: f64,
                size: usize,
                num_dims: usize,
                metadata: Option<&[usize]>,
            ) -> Result<()> {
                if output.dtype() != input.dtype() {
                    return Err(Error::DTypeMismatch { expected: input.dtype(), got: output.dtype() });
                }
                ensure_host(&[&*output, input])?;
                if size == 0 {
                    return Ok(());
                }

                let metadata = metadata_ptr(metadata);
                match input.dtype() {
                    $(
                        DType::$dtype => [<$name _ $dtype:lower>](
                            size,
                            num_dims,
                            metadata,
                            input.as_ptr() as *const [<$dtype:lower>],
                            scalar,
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

declare_unary_scalar_op!(mul_scalar, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);
declare_unary_scalar_op!(add_scalar, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);

/// # Safety
/// `metadata`, when given, must be `[dims, strides, offset]` and address only
/// distinct elements inside `output`.
pub unsafe fn fill(output: &mut dyn Buffer, value: f64, size: usize, num_dims: usize, metadata: Option<&[usize]>) -> Result<()> {
    ensure_host(&[&*output])?;
    if size == 0 {
        return Ok(());
    }

    let metadata = metadata_ptr(metadata);
    macro_rules! fill_as {
        ($($dtype:ident),*) => {
            paste::paste! {
                match output.dtype() {
                    $(DType::$dtype => [<fill_ $dtype:lower>](size, num_dims, metadata, output.as_mut_ptr() as *mut [<$dtype:lower>], value),)*
                }
            }
        };
    }
    fill_as!(BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64);

    Ok(())
}
