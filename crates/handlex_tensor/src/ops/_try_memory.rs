use crate::{
    autograd::{collect_next_edges, functions::CloneBackward},
    options::GradMode,
    utils::metadata::prepare_metadata,
    Tensor,
};
use handlex_core::{
    error::{Error, Result},
    layout::Layout,
    memory_format::MemoryFormat,
};
use std::sync::Arc;

/// ## Raw storage access
///
/// Kernel calls that bypass history recording. Writes still bump the version counter,
/// so saved tensors notice them.
impl Tensor {
    /// `self += rhs` element-wise. A strided destination that addresses one element
    /// several times receives every matching update.
    pub(crate) fn raw_add_assign(&self, rhs: &Tensor) -> Result<()> {
        self.execute_assign("add_", rhs, |out, rhs, size, num_dims, metadata| unsafe {
            handlex_core::be::ops::binary::add_assign(out, rhs, size, num_dims, metadata)
        })?;
        self.bump_version()?;
        Ok(())
    }

    /// Overwrites every element of `self` with the matching element of `src`.
    pub(crate) fn raw_copy_from(&self, src: &Tensor) -> Result<()> {
        self.execute_copy(src)?;
        self.bump_version()?;
        Ok(())
    }

    fn execute_copy(&self, src: &Tensor) -> Result<()> {
        self.execute_assign("copy_", src, |out, src, size, num_dims, metadata| unsafe {
            handlex_core::be::ops::binary::copy_assign(out, src, size, num_dims, metadata)
        })
    }

    pub(crate) fn raw_fill(&self, value: f64) -> Result<()> {
        self.execute_fill(value)?;
        self.bump_version()?;
        Ok(())
    }

    /// Fills without touching the version counter; only for tensors nothing else has seen.
    pub(crate) fn execute_fill(&self, value: f64) -> Result<()> {
        self.ensure_strided("fill_")?;
        let metadata = prepare_metadata(self.sizes(), &[self.layout()]);
        let mut out = self.try_storage()?.write()?;
        unsafe { handlex_core::be::ops::unary::fill(&mut **out, value, self.numel(), self.ndim(), metadata.as_deref()) }
    }

    /// A fresh, untracked tensor with `layout` holding a copy of `self`.
    pub(crate) fn raw_clone_into(&self, layout: Layout) -> Result<Tensor> {
        if layout.shape() != self.sizes() {
            return Err(Error::DimensionMismatch {
                expected: self.sizes().to_vec(),
                got: layout.shape().to_vec(),
            });
        }
        let len = layout.storage_extent();
        let output = Tensor::try_empty_with_layout(layout, len, self.device(), self.dtype())?;
        output.execute_copy(self)?;
        Ok(output)
    }

    fn execute_assign(
        &self,
        op: &'static str,
        rhs: &Tensor,
        kernel: impl FnOnce(&mut dyn handlex_core::buffer::Buffer, &dyn handlex_core::buffer::Buffer, usize, usize, Option<&[usize]>) -> Result<()>,
    ) -> Result<()> {
        self.ensure_matching_operand(op, rhs)?;
        let out_storage = self.try_storage()?;
        let rhs_storage = rhs.try_storage()?;

        // Kernels never read and write the same allocation.
        let staged;
        let rhs = if out_storage.is_same(rhs_storage) {
            staged = rhs.raw_clone_into(Layout::from_shape(rhs.sizes()))?;
            &staged
        } else {
            rhs
        };

        let metadata = prepare_metadata(self.sizes(), &[self.layout(), rhs.layout()]);
        {
            let mut out = out_storage.write()?;
            let src = rhs.try_storage()?.read()?;
            kernel(&mut **out, &**src, self.numel(), self.ndim(), metadata.as_deref())?;
        }
        Ok(())
    }
}

/// ## Copies
///
/// `clone_tensor` and `contiguous` produce new storage and record a pass-through
/// backward, so gradients flow back to the source.
impl Tensor {
    /// A copy with its own storage. Dense layouts keep their strides; anything else
    /// becomes row-major.
    pub fn try_clone_tensor(&self) -> Result<Tensor> {
        self.try_clone_tensor_with(GradMode::ENABLED)
    }

    pub fn try_clone_tensor_with(&self, mode: GradMode) -> Result<Tensor> {
        self.ensure_strided("clone")?;
        let layout = if self.is_non_overlapping_and_dense() {
            Layout::new(self.sizes(), self.strides(), 0)?
        } else {
            Layout::from_shape(self.sizes())
        };
        self.copy_with_history(mode, layout)
    }

    pub fn try_contiguous(&self) -> Result<Tensor> {
        self.try_contiguous_with_format(MemoryFormat::Contiguous)
    }

    /// `self` when it is already laid out in `format`, otherwise a copy that is.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` – `format` is [`MemoryFormat::Preserve`]
    /// * `IncompatibleShape` – a channels-last format on a tensor of the wrong rank
    pub fn try_contiguous_with_format(&self, format: MemoryFormat) -> Result<Tensor> {
        self.try_contiguous_format_with(GradMode::ENABLED, format)
    }

    pub fn try_contiguous_with(&self, mode: GradMode) -> Result<Tensor> {
        self.try_contiguous_format_with(mode, MemoryFormat::Contiguous)
    }

    pub fn try_contiguous_format_with(&self, mode: GradMode, format: MemoryFormat) -> Result<Tensor> {
        if format == MemoryFormat::Preserve {
            return Err(Error::InvalidArgument(
                "preserve is not a target memory format for contiguous".into(),
            ));
        }
        if self.try_impl()?.layout().is_contiguous_memory_format(format) {
            return Ok(self.clone());
        }
        self.ensure_strided("contiguous")?;
        let layout = Layout::with_memory_format(self.sizes(), format)?;
        self.copy_with_history(mode, layout)
    }

    pub(crate) fn copy_with_history(&self, mode: GradMode, layout: Layout) -> Result<Tensor> {
        let output = self.raw_clone_into(layout)?;
        if mode.is_enabled() && self.try_requires_grad()? {
            let next_edges = collect_next_edges(&[self])?;
            output.set_history(Arc::new(CloneBackward::new(next_edges)), 0)?;
        }
        Ok(output)
    }
}
