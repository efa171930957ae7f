use crate::Tensor;
use half::{bf16, f16};
use handlex_core::{
    cpu::utils::HostElement,
    dtype::{DType, Element},
    error::Result,
    layout::Layout,
};

/// ## Converting tensors to Rust vectors
///
/// These methods copy the tensor's logical elements (respecting shape, strides and
/// storage offset) into a row-major host `Vec`. When `T` is not the tensor's dtype
/// the values are cast element-wise.
impl Tensor {
    /// Runs [`try_to_flatten_vec`](Self::try_to_flatten_vec) and panics on failure.
    ///
    /// # Examples
    /// ```ignore
    /// let t = Tensor::new(&[1.0f32, 2.0, 3.0]);
    /// assert_eq!(t.to_flatten_vec::<f32>(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn to_flatten_vec<T: Element>(&self) -> Vec<T> {
        self.try_to_flatten_vec::<T>().expect("failed to flatten tensor to Vec")
    }

    /// # Errors
    ///
    /// * `NoStorage` – meta tensors have no elements to read
    /// * `UnsupportedLayout` – non-strided tensors
    pub fn try_to_flatten_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE == self.try_impl()?.dtype() {
            return self.read_native::<T>();
        }

        macro_rules! read_and_cast {
            ($($variant:ident => $t:ty),* $(,)?) => {
                match self.dtype() {
                    $(DType::$variant => Ok(self
                        .read_native::<$t>()?
                        .into_iter()
                        .map(|v| T::from_f64(v.to_f64()))
                        .collect()),)*
                }
            };
        }
        read_and_cast!(
            BF16 => bf16,
            F16 => f16,
            F32 => f32,
            F64 => f64,
            BOOL => bool,
            U8 => u8,
            U32 => u32,
            I8 => i8,
            I32 => i32,
            I64 => i64,
        )
    }

    /// Elements in the tensor's own dtype; `T` must match it.
    fn read_native<T: HostElement>(&self) -> Result<Vec<T>> {
        self.ensure_strided("to_flatten_vec")?;
        let dense;
        let source = if self.is_contiguous() {
            self
        } else {
            dense = self.raw_clone_into(Layout::from_shape(self.sizes()))?;
            &dense
        };

        let numel = source.numel();
        let mut out = vec![T::zero(); numel];
        let buffer = source.try_storage()?.read()?;
        unsafe {
            buffer.copy_to_host(
                out.as_mut_ptr() as *mut std::ffi::c_void,
                numel * std::mem::size_of::<T>(),
                source.storage_offset(),
                0,
            )?;
        }
        Ok(out)
    }
}
