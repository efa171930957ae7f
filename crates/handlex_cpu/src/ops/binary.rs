use crate::utils::{get_strided_index, split_metadata, storage_extent, HostElement};
#[allow(unused_imports)]
use half::{bf16, f16};
use rayon::prelude::*;

/// # Safety
///
/// Caller must guarantee that:
/// * `metadata` is either null (both inputs contiguous from element 0) or points to
///   `3 * num_dims + 2` elements laid out as
///   `[dims, lhs_strides, rhs_strides, lhs_offset, rhs_offset]`
/// * `lhs` and `rhs` cover every element addressed by their strides and offsets
/// * `out` is valid for `num_els` contiguous writes and does not overlap the inputs
pub unsafe fn binary_map<T, F>(
    num_els: usize,
    num_dims: usize,
    metadata: *const usize,
    lhs: *const T,
    rhs: *const T,
    out: *mut T,
    op: F,
) where
    T: HostElement,
    F: Fn(T, T) -> T + Send + Sync,
{
    let out = std::slice::from_raw_parts_mut(out, num_els);

    if metadata.is_null() {
        let lhs = std::slice::from_raw_parts(lhs, num_els);
        let rhs = std::slice::from_raw_parts(rhs, num_els);
        out.par_iter_mut()
            .zip(lhs.par_iter().zip(rhs.par_iter()))
            .for_each(|(o, (&a, &b))| *o = op(a, b));
        return;
    }

    let (dims, strides, offsets) = split_metadata(metadata, num_dims, 2);
    let lhs = std::slice::from_raw_parts(lhs, storage_extent(num_dims, dims, strides[0], offsets[0]));
    let rhs = std::slice::from_raw_parts(rhs, storage_extent(num_dims, dims, strides[1], offsets[1]));

    out.par_iter_mut().enumerate().for_each(|(i, o)| {
        let l = offsets[0] + get_strided_index(i, num_dims, dims, strides[0]);
        let r = offsets[1] + get_strided_index(i, num_dims, dims, strides[1]);
        *o = op(lhs[l], rhs[r]);
    });
}

/// # Safety
///
/// Caller must guarantee that:
/// * `metadata` is either null (both operands contiguous from element 0) or points to
///   `3 * num_dims + 2` elements laid out as
///   `[dims, out_strides, rhs_strides, out_offset, rhs_offset]`
/// * the positions addressed through `out` do not overlap `rhs`
///
/// A strided `out` may address one position several times; updates are applied in
/// index order, so repeated positions accumulate.
pub unsafe fn binary_assign<T, F>(
    num_els: usize,
    num_dims: usize,
    metadata: *const usize,
    out: *mut T,
    rhs: *const T,
    op: F,
) where
    T: HostElement,
    F: Fn(T, T) -> T + Send + Sync,
{
    if metadata.is_null() {
        let out = std::slice::from_raw_parts_mut(out, num_els);
        let rhs = std::slice::from_raw_parts(rhs, num_els);
        out.par_iter_mut().zip(rhs.par_iter()).for_each(|(o, &b)| *o = op(*o, b));
        return;
    }

    let (dims, strides, offsets) = split_metadata(metadata, num_dims, 2);
    let rhs = std::slice::from_raw_parts(rhs, storage_extent(num_dims, dims, strides[1], offsets[1]));

    for i in 0..num_els {
        let o = offsets[0] + get_strided_index(i, num_dims, dims, strides[0]);
        let r = offsets[1] + get_strided_index(i, num_dims, dims, strides[1]);
        let slot = out.add(o);
        *slot = op(*slot, rhs[r]);
    }
}

macro_rules! binary_op {
    ($name:ident, $op:expr, [$($t:ident),* $(,)?]) => {
        paste::paste! {
            $(
                /// # Safety
                ///
                /// See [`binary_map`].
                pub unsafe fn [<$name _ $t>](
                    num_els: usize,
                    num_dims: usize,
                    metadata: *const usize,
                    lhs: *const $t,
                    rhs: *const $t,
                    out: *mut $t,
                ) {
                    binary_map::<$t, _>(num_els, num_dims, metadata, lhs, rhs, out, $op)
                }
            )*
        }
    };
}

macro_rules! binary_assign_op {
    ($name:ident, $op:expr, [$($t:ident),* $(,)?]) => {
        paste::paste! {
            $(
                /// # Safety
                ///
                /// See [`binary_assign`].
                pub unsafe fn [<$name _ $t>](
                    num_els: usize,
                    num_dims: usize,
                    metadata: *const usize,
                    out: *mut $t,
                    rhs: *const $t,
                ) {
                    binary_assign::<$t, _>(num_els, num_dims, metadata, out, rhs, $op)
                }
            )*
        }
    };
}

binary_op!(add, |a, b| HostElement::add(a, b), [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
binary_op!(mul, |a, b| HostElement::mul(a, b), [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);

binary_assign_op!(add_assign, |a, b| HostElement::add(a, b), [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
binary_assign_op!(copy_assign, |_, b| b, [bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_contiguous() {
        let lhs = [1.0f32, 2.0, 3.0];
        let rhs = [10.0f32, 20.0, 30.0];
        let mut out = [0.0f32; 3];
        unsafe { add_f32(3, 1, std::ptr::null(), lhs.as_ptr(), rhs.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(out, [11.0, 22.0, 33.0]);
    }

    #[test]
    fn mul_strided_with_offset() {
        // lhs is the transpose of a 2x2 block stored after one padding element.
        let lhs = [0.0f64, 1.0, 2.0, 3.0, 4.0];
        let rhs = [2.0f64, 2.0, 2.0, 2.0];
        let metadata = [2, 2, 1, 2, 2, 1, 1, 0];
        let mut out = [0.0f64; 4];
        unsafe { mul_f64(4, 2, metadata.as_ptr(), lhs.as_ptr(), rhs.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(out, [2.0, 6.0, 4.0, 8.0]);
    }

    #[test]
    fn add_assign_strided_destination() {
        let mut out = [1i32, 1, 1, 1];
        let rhs = [5i32, 6];
        // write into every other element of `out`
        let metadata = [2, 2, 1, 0, 0];
        unsafe { add_assign_i32(2, 1, metadata.as_ptr(), out.as_mut_ptr(), rhs.as_ptr()) };
        assert_eq!(out, [6, 1, 7, 1]);
    }
}
