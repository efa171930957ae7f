use crate::{
    autograd::{collect_next_edges, functions::MulScalarBackward},
    options::GradMode,
    utils::metadata::prepare_metadata,
    Tensor,
};
use handlex_core::error::Result;
use std::sync::Arc;

macro_rules! impl_unary_scalar_execute {
    ($fn_name:ident, $op:literal, $backend_fn:path) => {
        fn $fn_name(&self, scalar: f64) -> Result<Tensor> {
            self.ensure_strided($op)?;
            let storage = self.try_storage()?;

            let output = Tensor::try_empty_with_spec(self.sizes(), self.device(), self.dtype())?;
            let metadata = prepare_metadata(self.sizes(), &[self.layout()]);
            {
                let mut out = output.try_storage()?.write()?;
                let input = storage.read()?;
                unsafe {
                    $backend_fn(&mut **out, &**input, scalar, self.numel(), self.ndim(), metadata.as_deref())?;
                }
            }

            Ok(output)
        }
    };
}

impl Tensor {
    impl_unary_scalar_execute!(execute_mul_scalar, "mul_scalar", handlex_core::be::ops::unary::mul_scalar);

    pub fn try_mul_scalar(&self, scalar: f64) -> Result<Tensor> {
        self.try_mul_scalar_with(GradMode::ENABLED, scalar)
    }

    pub fn try_mul_scalar_with(&self, mode: GradMode, scalar: f64) -> Result<Tensor> {
        let output = self.execute_mul_scalar(scalar)?;
        if mode.is_enabled() && self.try_requires_grad()? {
            let next_edges = collect_next_edges(&[self])?;
            output.set_history(Arc::new(MulScalarBackward::new(next_edges, scalar)), 0)?;
        }
        Ok(output)
    }
}
