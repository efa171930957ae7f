use crate::{options::GradMode, tensor_impl::TensorImpl, Tensor};
use handlex_core::{error::Result, layout::Layout};

/// ## Views
///
/// Every view shares storage and the version counter with its source and records the
/// root base, never an intermediate view. Views made while recording is off are
/// non-differentiable and never derive a grad_fn from their base.
impl Tensor {
    pub(crate) fn make_view(&self, mode: GradMode, layout: Layout) -> Result<Tensor> {
        let inner = self.try_impl()?;
        let (base, differentiable) = match inner.view_meta() {
            Some(view) => (view.base.clone(), view.differentiable && mode.is_enabled()),
            None => (self.clone(), mode.is_enabled()),
        };
        let alias = TensorImpl::new_alias(inner, layout, Some((base, differentiable)))?;
        Ok(Tensor::from_impl(alias))
    }

    /// A view with the same elements in a new shape. Requires a contiguous source.
    pub fn try_view(&self, shape: &[usize]) -> Result<Tensor> {
        self.try_view_with(GradMode::ENABLED, shape)
    }

    pub fn try_view_with(&self, mode: GradMode, shape: &[usize]) -> Result<Tensor> {
        self.ensure_strided("view")?;
        let layout = self.layout().view(shape)?;
        self.make_view(mode, layout)
    }

    pub fn try_transpose(&self, dim0: i64, dim1: i64) -> Result<Tensor> {
        self.try_transpose_with(GradMode::ENABLED, dim0, dim1)
    }

    pub fn try_transpose_with(&self, mode: GradMode, dim0: i64, dim1: i64) -> Result<Tensor> {
        self.ensure_strided("transpose")?;
        let layout = self
            .layout()
            .transpose(self.try_wrap_dim(dim0)?, self.try_wrap_dim(dim1)?)?;
        self.make_view(mode, layout)
    }

    pub fn try_permute(&self, dims: &[i64]) -> Result<Tensor> {
        self.try_permute_with(GradMode::ENABLED, dims)
    }

    pub fn try_permute_with(&self, mode: GradMode, dims: &[i64]) -> Result<Tensor> {
        self.ensure_strided("permute")?;
        let dims = dims
            .iter()
            .map(|&d| self.try_wrap_dim(d))
            .collect::<Result<Vec<_>>>()?;
        let layout = self.layout().permute(&dims)?;
        self.make_view(mode, layout)
    }

    /// Elements `start..start + length` along `dim`.
    pub fn try_narrow(&self, dim: i64, start: usize, length: usize) -> Result<Tensor> {
        self.try_narrow_with(GradMode::ENABLED, dim, start, length)
    }

    pub fn try_narrow_with(&self, mode: GradMode, dim: i64, start: usize, length: usize) -> Result<Tensor> {
        self.ensure_strided("narrow")?;
        let layout = self.layout().narrow(self.try_wrap_dim(dim)?, start, length)?;
        self.make_view(mode, layout)
    }

    /// A view with arbitrary geometry over the same storage; `offset` is absolute.
    pub fn try_as_strided(&self, shape: &[usize], strides: &[usize], offset: usize) -> Result<Tensor> {
        self.try_as_strided_with(GradMode::ENABLED, shape, strides, offset)
    }

    pub fn try_as_strided_with(&self, mode: GradMode, shape: &[usize], strides: &[usize], offset: usize) -> Result<Tensor> {
        self.ensure_strided("as_strided")?;
        let layout = Layout::new(shape, strides, offset)?;
        self.make_view(mode, layout)
    }
}
