use crate::{
    be::{ensure_host, metadata_ptr},
    buffer::Buffer,
    dtype::DType,
    error::{Error, Result},
};
#[allow(unused_imports)]
use half::{bf16, f16};
use handlex_cpu::ops::binary::*;

#[macro_export]
macro_rules! declare_binary_op {
    ($name:ident, [$($dtype:ident),* $(,)?]) => {
        paste::paste! {
            /// # Safety
            /// `metadata`, when given, must be `[dims, lhs_strides, rhs_strides, lhs_offset, rhs_offset]`
            /// and address only elements inside `lhs` and `rhs`. `output` holds `size` contiguous elements.
            pub unsafe fn $name(
                output: &mut dyn Buffer,
                lhs: &dyn Buffer,
                rhs: &dyn Buffer,
                size: usize,
                num_dims: usize,
                metadata: Option<&[usize]>,
            ) -> Result<()> {
                if lhs.dtype() != rhs.dtype() {
                    return Err(Error::DTypeMismatch { expected: lhs.dtype(), got: rhs.dtype() });
                }
                if output.dtype() != lhs.dtype() {
                    return Err(Error::DTypeMismatch { expected: lhs.dtype(), got: output.dtype() });
                }
                ensure_host(&[&*output, lhs, rhs])?;
                if size == 0 {
                    return Ok(());
                }

                let metadata = metadata_ptr(metadata);
                match lhs.dtype() {
                    $(
                        DType::$dtype => [<$name _ $dtype:lower>](
                            size,
                            num_dims,
                            metadata,
                            lhs.as_ptr() as *const [<$dtype:lower>],
                            rhs.as_ptr() as *const [<$dtype:lower>],
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

#[macro_export]
macro_rules! declare_binary_assign_op {
    ($name:ident, [$($dtype:ident),* $(,)?]) => {
        paste::paste! {
            /// # Safety
            /// `metadata`, when given, must be `[dims, out_strides, rhs_strides, out_offset, rhs_offset]`.
            /// `output` and `rhs` must be different allocations.
            pub unsafe fn $name(
                output: &mut dyn Buffer,
                rhs: &dyn Buffer,
                size: usize,
                num_dims: usize,
                metadata: Option<&[usize]>,
            ) -> Result<()> {
                if output.dtype() != rhs.dtype() {
                    return Err(Error::DTypeMismatch { expected: output.dtype(), got: rhs.dtype() });
                }
                ensure_host(&[&*output, rhs])?;
                if size == 0 {
                    return Ok(());
                }

                let metadata = metadata_ptr(metadata);
                match output.dtype() {
                    $(
                        DType::$dtype => [<$name _ $dtype:lower>](
                            size,
                            num_dims,
                            metadata,
                            output.as_mut_ptr() as *mut [<$dtype:lower>],
                            rhs.as_ptr() as *const [<$dtype:lower>],
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

declare_binary_op!(add, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);
declare_binary_op!(mul, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);

declare_binary_assign_op!(add_assign, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);
declare_binary_assign_op!(copy_assign, [BF16, F16, F32, F64, BOOL, U8, U32, I8, I32, I64]);
