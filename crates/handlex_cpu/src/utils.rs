use half::{bf16, f16};

/// Element types the host kernels know how to load, store and combine.
///
/// Integer arithmetic wraps instead of panicking; gradients never flow through
/// integer tensors, so wrapping only matters for plain data ops.
pub trait HostElement: Copy + Send + Sync + 'static {
    fn zero() -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
}

macro_rules! impl_host_float {
    ($t:ty) => {
        impl HostElement for $t {
            #[inline(always)]
            fn zero() -> Self {
                0.0
            }
            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                self + rhs
            }
            #[inline(always)]
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }
        }
    };
}

macro_rules! impl_host_half {
    ($t:ty) => {
        impl HostElement for $t {
            #[inline(always)]
            fn zero() -> Self {
                <$t>::ZERO
            }
            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                <$t>::from_f64(value)
            }
            #[inline(always)]
            fn to_f64(self) -> f64 {
                <$t>::to_f64(self)
            }
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                self + rhs
            }
            #[inline(always)]
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }
        }
    };
}

macro_rules! impl_host_int {
    ($t:ty) => {
        impl HostElement for $t {
            #[inline(always)]
            fn zero() -> Self {
                0
            }
            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            #[inline(always)]
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        }
    };
}

impl_host_float!(f32);
impl_host_float!(f64);
impl_host_half!(bf16);
impl_host_half!(f16);
impl_host_int!(u8);
impl_host_int!(u32);
impl_host_int!(i8);
impl_host_int!(i32);
impl_host_int!(i64);

impl HostElement for bool {
    #[inline(always)]
    fn zero() -> Self {
        false
    }
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value != 0.0
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        self | rhs
    }
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        self & rhs
    }
}

#[inline]
pub fn is_contiguous(num_dims: usize, dims: &[usize], strides: &[usize]) -> bool {
    let mut acc = 1;
    for d in 0..num_dims {
        let dim_idx = num_dims - 1 - d;
        if dims[dim_idx] > 1 && acc != strides[dim_idx] {
            return false;
        }
        acc *= dims[dim_idx];
    }
    true
}

#[inline]
pub fn get_strided_index(idx: usize, num_dims: usize, dims: &[usize], strides: &[usize]) -> usize {
    let mut strided_i = 0;
    let mut remaining_idx = idx;

    for d in 0..num_dims {
        let dim_idx = num_dims - 1 - d;
        strided_i += (remaining_idx % dims[dim_idx]) * strides[dim_idx];
        remaining_idx /= dims[dim_idx];
    }

    strided_i
}

/// Number of elements a strided view reaches into its buffer, counting the offset.
#[inline]
pub fn storage_extent(num_dims: usize, dims: &[usize], strides: &[usize], offset: usize) -> usize {
    if dims[..num_dims].iter().any(|&d| d == 0) {
        return 0;
    }
    let mut last = offset;
    for d in 0..num_dims {
        last += (dims[d] - 1) * strides[d];
    }
    last + 1
}

/// Splits a `[dims, strides_0, .., strides_{k-1}, offset_0, .., offset_{k-1}]`
/// metadata block into its parts.
///
/// # Safety
/// `metadata` must point to `num_dims * (k + 1) + k` readable `usize`s.
#[inline]
pub unsafe fn split_metadata<'a>(
    metadata: *const usize,
    num_dims: usize,
    k: usize,
) -> (&'a [usize], Vec<&'a [usize]>, &'a [usize]) {
    let dims = std::slice::from_raw_parts(metadata, num_dims);
    let strides = (0..k)
        .map(|i| std::slice::from_raw_parts(metadata.add((i + 1) * num_dims), num_dims))
        .collect();
    let offsets = std::slice::from_raw_parts(metadata.add((k + 1) * num_dims), k);
    (dims, strides, offsets)
}
