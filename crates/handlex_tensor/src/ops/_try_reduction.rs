use crate::{
    autograd::{collect_next_edges, functions::SumBackward},
    options::GradMode,
    utils::metadata::prepare_metadata,
    Tensor,
};
use handlex_core::error::Result;
use std::sync::Arc;

impl Tensor {
    /// Sum of every element as a zero-dimensional tensor.
    pub fn try_sum(&self) -> Result<Tensor> {
        self.try_sum_with(GradMode::ENABLED)
    }

    pub fn try_sum_with(&self, mode: GradMode) -> Result<Tensor> {
        self.ensure_strided("sum")?;
        let storage = self.try_storage()?;

        let output = Tensor::try_empty_with_spec(&[], self.device(), self.dtype())?;
        let metadata = prepare_metadata(self.sizes(), &[self.layout()]);
        {
            let mut out = output.try_storage()?.write()?;
            let input = storage.read()?;
            unsafe {
                handlex_core::be::ops::reduction::sum(&mut **out, &**input, self.numel(), self.ndim(), metadata.as_deref())?;
            }
        }

        if mode.is_enabled() && self.try_requires_grad()? {
            let next_edges = collect_next_edges(&[self])?;
            output.set_history(Arc::new(SumBackward::new(next_edges, self.sizes())), 0)?;
        }
        Ok(output)
    }
}
