use crate::{adapter::TensorAdapter, options::TensorOptions, storage::Storage, tensor_impl::TensorImpl, Tensor};
use half::{bf16, f16};
use handlex_core::{
    cpu::utils::HostElement,
    device::{get_default_device, Device},
    dtype::{get_default_dtype, DType, Element},
    error::{Error, Result},
    layout::Layout,
};
use rand_distr::{Distribution, Normal};

/// Copies `data` into `storage`, casting element-wise when `dtype` is not `T`'s own.
fn write_host<T: Element>(storage: &Storage, data: &[T]) -> Result<()> {
    let dtype = storage.dtype();
    if dtype == T::DTYPE {
        return write_host_exact(storage, data);
    }

    macro_rules! cast_into {
        ($($variant:ident => $t:ty),* $(,)?) => {
            match dtype {
                $(DType::$variant => {
                    let converted: Vec<$t> = data.iter().map(|&v| <$t as HostElement>::from_f64(v.to_f64())).collect();
                    write_host_exact(storage, &converted)
                })*
            }
        };
    }
    cast_into!(
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

fn write_host_exact<T: HostElement>(storage: &Storage, data: &[T]) -> Result<()> {
    let mut buffer = storage.write()?;
    unsafe { buffer.copy_from_host(data.as_ptr() as *const std::ffi::c_void, std::mem::size_of_val(data), 0, 0) }
}

/// ## Factory & initialization helpers
///
/// * Generic constructors: `new`, `new_with_spec`, `from_flatten_vec`
/// * Pattern initializers: `empty`, `zeros`, `ones`, `full`, `randn` and their `_like`
///   forms
/// * Layout control: `empty_strided`, `empty_meta`
/// * `*_with_options` take a [`TensorOptions`] for dtype, device, layout kind,
///   `requires_grad` and inference overrides
///
/// Each infallible method is a thin wrapper that panics on error around its fallible
/// counterpart (`try_*`). Tensors produced here are leaves with a fresh version counter.
impl Tensor {
    pub fn new<T: TensorAdapter>(data: T) -> Self {
        Self::try_new(data).expect("failed to create tensor")
    }

    pub fn new_with_spec<T: TensorAdapter>(data: T, device: Device, dtype: DType) -> Self {
        Self::try_new_with_spec(data, device, dtype).expect("failed to create tensor with specified device and dtype")
    }

    pub fn from_flatten_vec<T: TensorAdapter>(data: T, shape: &[usize]) -> Self {
        Self::try_from_flatten_vec(data, shape).expect("failed to create tensor from flatten vec")
    }

    pub fn empty(shape: &[usize]) -> Self {
        Self::try_empty(shape).expect("failed to create empty tensor")
    }

    pub fn empty_with_spec(shape: &[usize], device: Device, dtype: DType) -> Self {
        Self::try_empty_with_spec(shape, device, dtype).expect("failed to create empty tensor with specified device and dtype")
    }

    pub fn empty_strided(shape: &[usize], strides: &[usize]) -> Self {
        Self::try_empty_strided(shape, strides).expect("failed to create strided tensor")
    }

    pub fn empty_meta(shape: &[usize]) -> Self {
        Self::try_empty_meta(shape).expect("failed to create meta tensor")
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::try_zeros(shape).expect("failed to create zeros tensor")
    }

    pub fn zeros_like(src: &Tensor) -> Self {
        Self::try_zeros_like(src).expect("failed to create zeros_like tensor")
    }

    pub fn zeros_with_spec(shape: &[usize], device: Device, dtype: DType) -> Self {
        Self::try_zeros_with_spec(shape, device, dtype).expect("failed to create zeros tensor with specified device and dtype")
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::try_ones(shape).expect("failed to create ones tensor")
    }

    pub fn ones_like(src: &Tensor) -> Self {
        Self::try_ones_like(src).expect("failed to create ones_like tensor")
    }

    pub fn ones_with_spec(shape: &[usize], device: Device, dtype: DType) -> Self {
        Self::try_ones_with_spec(shape, device, dtype).expect("failed to create ones tensor with specified device and dtype")
    }

    pub fn full(shape: &[usize], value: f64) -> Self {
        Self::try_full(shape, value).expect("failed to create filled tensor")
    }

    pub fn randn(shape: &[usize]) -> Self {
        Self::try_randn(shape).expect("failed to create random tensor")
    }

    pub fn zeros_with_options(shape: &[usize], options: TensorOptions) -> Self {
        Self::try_zeros_with_options(shape, options).expect("failed to create zeros tensor with options")
    }

    pub fn ones_with_options(shape: &[usize], options: TensorOptions) -> Self {
        Self::try_ones_with_options(shape, options).expect("failed to create ones tensor with options")
    }

    pub fn full_with_options(shape: &[usize], value: f64, options: TensorOptions) -> Self {
        Self::try_full_with_options(shape, value, options).expect("failed to create filled tensor with options")
    }
}

impl Tensor {
    /// Tensor from host data, keeping the data's own dtype.
    ///
    /// # Examples
    /// ```ignore
    /// let t = Tensor::try_new(vec![vec![1.0f32, 2.0], vec![3.0, 4.0]])?;
    /// assert_eq!(t.sizes(), &[2, 2]);
    /// ```
    pub fn try_new<T: TensorAdapter>(data: T) -> Result<Self> {
        let dtype = data.dtype();
        Self::try_new_with_spec(data, get_default_device(), dtype)
    }

    /// # Errors
    ///
    /// * `IncompatibleShape` – ragged nested data
    /// * `InvalidDevice` – `device` has no buffer implementation
    pub fn try_new_with_spec<T: TensorAdapter>(data: T, device: Device, dtype: DType) -> Result<Self> {
        let shape = data.get_shape();
        let flat = data.to_flatten_vec()?;
        Self::from_host(&flat, &shape, TensorOptions::new().device(device).dtype(dtype))
    }

    /// Tensor of `shape` from row-major host data.
    ///
    /// # Errors
    ///
    /// * `IncompatibleShape` – `shape` does not hold exactly as many elements as `data`
    pub fn try_from_flatten_vec<T: TensorAdapter>(data: T, shape: &[usize]) -> Result<Self> {
        let dtype = data.dtype();
        let flat = data.to_flatten_vec()?;
        if Layout::compute_size(shape) != flat.len() {
            return Err(Error::IncompatibleShape(format!(
                "shape {:?} holds {} elements but {} were given",
                shape,
                Layout::compute_size(shape),
                flat.len()
            )));
        }
        Self::from_host(&flat, shape, TensorOptions::new().device(get_default_device()).dtype(dtype))
    }

    fn from_host<T: Element>(data: &[T], shape: &[usize], options: TensorOptions) -> Result<Self> {
        let layout = Layout::from_shape(shape);
        let len = layout.size();
        let tensor = Self::try_alloc(layout, len, options)?;
        write_host(tensor.try_storage()?, data)?;
        Ok(tensor)
    }

    /// Binds a fresh allocation of `storage_len` elements to `layout`; meta tensors get
    /// no storage at all.
    fn try_alloc(layout: Layout, storage_len: usize, options: TensorOptions) -> Result<Self> {
        let device = options.resolved_device();
        let tensor_impl = if device == Device::Meta {
            TensorImpl::new_meta(layout, options)?
        } else {
            let storage = Storage::allocate(storage_len, device, options.resolved_dtype())?;
            TensorImpl::new(storage, layout, options)?
        };
        Ok(Tensor::from_impl(tensor_impl))
    }

    pub(crate) fn try_empty_with_layout(layout: Layout, storage_len: usize, device: Device, dtype: DType) -> Result<Self> {
        Self::try_alloc(layout, storage_len, TensorOptions::new().device(device).dtype(dtype))
    }

    fn try_full_layout(layout: Layout, value: f64, options: TensorOptions) -> Result<Self> {
        let len = layout.storage_extent();
        let tensor = Self::try_alloc(layout, len, options)?;
        // Fresh buffers are zeroed.
        if value != 0.0 && tensor.try_impl()?.storage().is_some() {
            tensor.execute_fill(value)?;
        }
        Ok(tensor)
    }

    pub fn try_empty(shape: &[usize]) -> Result<Self> {
        Self::try_empty_with_spec(shape, get_default_device(), get_default_dtype())
    }

    pub fn try_empty_with_spec(shape: &[usize], device: Device, dtype: DType) -> Result<Self> {
        let layout = Layout::from_shape(shape);
        let len = layout.size();
        Self::try_empty_with_layout(layout, len, device, dtype)
    }

    pub fn try_empty_with_options(shape: &[usize], options: TensorOptions) -> Result<Self> {
        let layout = Layout::from_shape(shape);
        let len = layout.size();
        Self::try_alloc(layout, len, options)
    }

    /// Uninitialized tensor with explicit strides; the storage covers every addressed
    /// element.
    pub fn try_empty_strided(shape: &[usize], strides: &[usize]) -> Result<Self> {
        Self::try_empty_strided_with_spec(shape, strides, get_default_device(), get_default_dtype())
    }

    pub fn try_empty_strided_with_spec(shape: &[usize], strides: &[usize], device: Device, dtype: DType) -> Result<Self> {
        let layout = Layout::new(shape, strides, 0)?;
        let len = layout.storage_extent();
        Self::try_empty_with_layout(layout, len, device, dtype)
    }

    /// Shape-only tensor on the meta device; it has no storage and kernels reject it.
    pub fn try_empty_meta(shape: &[usize]) -> Result<Self> {
        Self::try_empty_with_options(shape, TensorOptions::new().device(Device::Meta))
    }

    pub fn try_zeros(shape: &[usize]) -> Result<Self> {
        Self::try_zeros_with_spec(shape, get_default_device(), get_default_dtype())
    }

    pub fn try_zeros_like(src: &Tensor) -> Result<Self> {
        Self::try_zeros_with_spec(src.sizes(), src.device(), src.dtype())
    }

    pub fn try_zeros_with_spec(shape: &[usize], device: Device, dtype: DType) -> Result<Self> {
        Self::try_full_with_spec(shape, 0.0, device, dtype)
    }

    pub fn try_zeros_with_options(shape: &[usize], options: TensorOptions) -> Result<Self> {
        Self::try_full_with_options(shape, 0.0, options)
    }

    /// Zeros with `layout`'s exact geometry, storage offset included.
    pub(crate) fn try_zeros_strided_with_spec(layout: &Layout, device: Device, dtype: DType) -> Result<Self> {
        Self::try_full_layout(layout.clone(), 0.0, TensorOptions::new().device(device).dtype(dtype))
    }

    pub fn try_ones(shape: &[usize]) -> Result<Self> {
        Self::try_ones_with_spec(shape, get_default_device(), get_default_dtype())
    }

    pub fn try_ones_like(src: &Tensor) -> Result<Self> {
        Self::try_ones_with_spec(src.sizes(), src.device(), src.dtype())
    }

    pub fn try_ones_with_spec(shape: &[usize], device: Device, dtype: DType) -> Result<Self> {
        Self::try_full_with_spec(shape, 1.0, device, dtype)
    }

    pub fn try_ones_with_options(shape: &[usize], options: TensorOptions) -> Result<Self> {
        Self::try_full_with_options(shape, 1.0, options)
    }

    pub fn try_full(shape: &[usize], value: f64) -> Result<Self> {
        Self::try_full_with_spec(shape, value, get_default_device(), get_default_dtype())
    }

    pub fn try_full_with_spec(shape: &[usize], value: f64, device: Device, dtype: DType) -> Result<Self> {
        Self::try_full_with_options(shape, value, TensorOptions::new().device(device).dtype(dtype))
    }

    pub fn try_full_with_options(shape: &[usize], value: f64, options: TensorOptions) -> Result<Self> {
        Self::try_full_layout(Layout::from_shape(shape), value, options)
    }

    /// Samples from the standard normal distribution.
    pub fn try_randn(shape: &[usize]) -> Result<Self> {
        Self::try_randn_with_spec(shape, get_default_device(), get_default_dtype())
    }

    pub fn try_randn_with_spec(shape: &[usize], device: Device, dtype: DType) -> Result<Self> {
        let normal = Normal::new(0.0f64, 1.0).map_err(|e| Error::External { message: e.to_string() })?;
        let mut rng = rand::thread_rng();
        let samples: Vec<f64> = (0..Layout::compute_size(shape)).map(|_| normal.sample(&mut rng)).collect();
        Self::from_host(&samples, shape, TensorOptions::new().device(device).dtype(dtype))
    }
}
