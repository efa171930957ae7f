use crate::{
    autograd::{
        collect_next_edges,
        functions::{AddBackward, MulBackward},
    },
    options::GradMode,
    utils::metadata::prepare_metadata,
    Tensor,
};
use handlex_core::error::Result;
use std::sync::Arc;

macro_rules! impl_binary_execute {
    ($fn_name:ident, $op:literal, $backend_fn:path) => {
        fn $fn_name(&self, rhs: &Tensor) -> Result<Tensor> {
            self.ensure_matching_operand($op, rhs)?;
            let (lhs_storage, rhs_storage) = (self.try_storage()?, rhs.try_storage()?);

            let output = Tensor::try_empty_with_spec(self.sizes(), self.device(), self.dtype())?;
            let metadata = prepare_metadata(self.sizes(), &[self.layout(), rhs.layout()]);
            {
                let mut out = output.try_storage()?.write()?;
                if lhs_storage.is_same(rhs_storage) {
                    let shared = lhs_storage.read()?;
                    unsafe {
                        $backend_fn(&mut **out, &**shared, &**shared, self.numel(), self.ndim(), metadata.as_deref())?;
                    }
                } else {
                    let lhs_buffer = lhs_storage.read()?;
                    let rhs_buffer = rhs_storage.read()?;
                    unsafe {
                        $backend_fn(&mut **out, &**lhs_buffer, &**rhs_buffer, self.numel(), self.ndim(), metadata.as_deref())?;
                    }
                }
            }

            Ok(output)
        }
    };
}

/// ## Element-wise binary operations
///
/// Operands must have equal shapes, dtypes and devices; there is no broadcasting or
/// type promotion. The `*_with` forms take the recording mode explicitly; the plain
/// forms record when either operand requires grad.
impl Tensor {
    impl_binary_execute!(execute_add, "add", handlex_core::be::ops::binary::add);
    impl_binary_execute!(execute_mul, "mul", handlex_core::be::ops::binary::mul);

    pub fn try_add(&self, rhs: &Tensor) -> Result<Tensor> {
        self.try_add_with(GradMode::ENABLED, rhs)
    }

    pub fn try_add_with(&self, mode: GradMode, rhs: &Tensor) -> Result<Tensor> {
        let output = self.execute_add(rhs)?;
        if mode.is_enabled() && (self.try_requires_grad()? || rhs.try_requires_grad()?) {
            let next_edges = collect_next_edges(&[self, rhs])?;
            output.set_history(Arc::new(AddBackward::new(next_edges)), 0)?;
        }
        Ok(output)
    }

    pub fn try_mul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.try_mul_with(GradMode::ENABLED, rhs)
    }

    pub fn try_mul_with(&self, mode: GradMode, rhs: &Tensor) -> Result<Tensor> {
        let output = self.execute_mul(rhs)?;
        if mode.is_enabled() && (self.try_requires_grad()? || rhs.try_requires_grad()?) {
            let next_edges = collect_next_edges(&[self, rhs])?;
            output.set_history(Arc::new(MulBackward::new(next_edges, self, rhs)), 0)?;
        }
        Ok(output)
    }
}
