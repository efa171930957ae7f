use crate::utils::{get_strided_index, split_metadata, storage_extent, HostElement};
#[allow(unused_imports)]
use half::{bf16, f16};
use rayon::prelude::*;

/// # Safety
///
/// Caller must guarantee that `metadata` is either null (input contiguous from element 0)
/// or points to `2 * num_dims + 1` elements laid out as `[dims, strides, offset]`, that
/// `input` covers every addressed element, and that `out` is valid for one write.
pub unsafe fn sum_all<T: HostElement>(num_els: usize, num_dims: usize, metadata: *const usize, input: *const T, out: *mut T) {
    let total = if metadata.is_null() {
        let input = std::slice::from_raw_parts(input, num_els);
        input.par_iter().copied().reduce(T::zero, T::add)
    } else {
        let (dims, strides, offsets) = split_metadata(metadata, num_dims, 1);
        let input = std::slice::from_raw_parts(input, storage_extent(num_dims, dims, strides[0], offsets[0]));
        (0..num_els)
            .into_par_iter()
            .map(|i| input[offsets[0] + get_strided_index(i, num_dims, dims, strides[0])])
            .reduce(T::zero, T::add)
    };
    *out = total;
}

macro_rules! sum_op {
    ([$($t:ident),* $(,)?]) => {
        paste::paste! {
            $(
                /// # Safety
                ///
                /// See [`sum_all`].
                pub unsafe fn [<sum_ $t>](num_els: usize, num_dims: usize, metadata: *const usize, input: *const $t, out: *mut $t) {
                    sum_all::<$t>(num_els, num_dims, metadata, input, out)
                }
            )*
        }
    };
}

sum_op!([bf16, f16, f32, f64, bool, u8, u32, i8, i32, i64]);
