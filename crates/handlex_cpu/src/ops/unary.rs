use crate::utils::{get_strided_index, split_metadata, storage_extent, HostElement};
#[allow(unused_imports)]
use half::{bf16, f16};
use rayon::prelude::*;

/// # Safety
///
/// Caller must guarantee that:
/// * `metadata` is either null (input contiguous from element 0) or points to
///   `2 * num_dims + 1` elements laid out as `[dims, strides, offset]`
/// * `input` covers every element addressed by its strides and offset
/// * `out` is valid for `num_els` contiguous writes and does not overlap `input`
pub unsafe fn unary_map<T, F>(num_els: usize, num_dims: usize, metadata: *const usize, input: *const T, out: *mut T, op: F)
where
    T: HostElement,
    F: Fn(T) -> T + Send + Sync,
{
    let out = std::slice::from_raw_parts_mut(out, num_els);

    if metadata.is_null() {
        let input = std::slice::from_raw_parts(input, num_els);
        out.par_iter_mut().zip(input.par_iter()).for_each(|(o, &x)| *o = op(x));
        return;
    }

    let (dims, strides, offsets) = split_metadata(metadata, num_dims, 1);
    let input = std::slice::from_raw_parts(input, storage_extent(num_dims, dims, strides[0], offsets[0]));

    out.par_iter_mut().enumerate().for_each(|(i, o)| {
        let idx = offsets[0] + get_strided_index(i, num_dims, dims, strides[0]);
        *o = op(input[idx]);
    });
}

/// # Safety
///
/// Caller must guarantee that `metadata` is either null (`out` contiguous from element 0)
/// or points to `2 * num_dims + 1` elements laid out as `[dims, strides, offset]`, and
/// that the addressed positions of `out` are writable.
pub unsafe fn fill_strided<T: HostElement>(num_els: usize, num_dims: usize, metadata: *const usize, out: *mut T, value: T) {
    if metadata.is_null() {
        let out = std::slice::from_raw_parts_mut(out, num_els);
        out.par_iter_mut().for_each(|o| *o = value);
        return;
    }

    let (dims, strides, offsets) = split_metadata(metadata, num_dims, 1);
    for i in 0..num_els {
        let idx = offsets[0] + get_strided_index(i, num_dims, dims, strides[0]);
        *out.add(idx) = value;
    }
}

macro_rules! unary_scalar_op {
    ($name:ident, $op:ident, [$($t:ident),* $(,)?]) => {
        paste::paste! {
            $(
                /// # Safety
                ///
                /// See [`unary_map`].
                pub unsafe fn [<$name _ $t>](
                    num_els: usize,
                    num_dims: usize,
                    metadata: *const usize,
                    input: *const $t,
                    scalar: f64,
                    out: *mut $t,
                ) {
                    let scalar = <$t as HostElement>::from_f64(scalar);
                    unary_map::<$t, _>(num_els, num_dims, metadata, input, out, |x| HostElement::$op(x, scalar))
                }
            )*
        }
    };
}

macro_rules! fill_op {
    ([$($t:ident),* $(,)?]) => {
        paste::paste! {
            $(
                /// # Safety
                ///
                /// See [`fill_strided`].
                pub unsafe fn [<fill_ $t>](num_els: usize, num_dims: usize, metadata: *const usize, out: *mut $t, value: f64) {
                    fill_strided::<$t>(num_els, num_dims, metadata, out, <$t as HostElement>::from_f64(value))
                }
            )*
        }
    };
}

unary_scalar_op!(mul_scalar, mul, [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
unary_scalar_op!(add_scalar, add, [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
fill_op!([bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
