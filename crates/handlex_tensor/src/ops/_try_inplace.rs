use crate::{
    autograd::{
        collect_next_edges,
        functions::{AddBackward, CopyBackward, CopySlices},
        Edge, Node,
    },
    options::GradMode,
    Tensor,
};
use handlex_core::error::{Error, Result};
use std::sync::Arc;

/// ## In-place operations
///
/// `add_` and `copy_` overwrite `self`'s elements, bump the version counter shared with
/// every alias and, when recording, rebase the history: a plain tensor takes the op's
/// backward as its new grad_fn, while a view hands a `CopySlices` node to its base so the
/// base's gradient sees the write too.
impl Tensor {
    pub fn try_add_(&self, rhs: &Tensor) -> Result<()> {
        self.try_add_inplace_with(GradMode::ENABLED, rhs)
    }

    pub fn try_add_inplace_with(&self, mode: GradMode, rhs: &Tensor) -> Result<()> {
        let next_edges = self.prepare_inplace(mode, rhs)?;
        self.raw_add_assign(rhs)?;
        if let Some(next_edges) = next_edges {
            self.rebase_history(Arc::new(AddBackward::new(next_edges)))?;
        }
        Ok(())
    }

    pub fn try_copy_(&self, src: &Tensor) -> Result<()> {
        self.try_copy_inplace_with(GradMode::ENABLED, src)
    }

    pub fn try_copy_inplace_with(&self, mode: GradMode, src: &Tensor) -> Result<()> {
        let next_edges = self.prepare_inplace(mode, src)?;
        self.raw_copy_from(src)?;
        if let Some(next_edges) = next_edges {
            self.rebase_history(Arc::new(CopyBackward::new(next_edges)))?;
        }
        Ok(())
    }

    /// Rejects writes autograd cannot account for and, when the op must be recorded,
    /// captures the operands' edges as they are before the write.
    fn prepare_inplace(&self, mode: GradMode, other: &Tensor) -> Result<Option<Vec<Edge>>> {
        if !mode.is_enabled() {
            return Ok(None);
        }
        let inner = self.try_impl()?;
        match inner.view_meta() {
            None => {
                if self.try_requires_grad()? && self.try_is_leaf()? {
                    return Err(Error::RequiresGrad(
                        "a leaf Variable that requires grad is being used in an in-place operation.".into(),
                    ));
                }
            },
            Some(view) => {
                let base_requires_grad = view.base.try_requires_grad()?;
                if base_requires_grad && !view.differentiable {
                    return Err(Error::RequiresGrad(
                        "a view was created while history recording was off and is being modified in-place while its base requires grad.".into(),
                    ));
                }
                if base_requires_grad && view.base.try_is_leaf()? {
                    return Err(Error::RequiresGrad(
                        "a view of a leaf Variable that requires grad is being used in an in-place operation.".into(),
                    ));
                }
            },
        }
        if !self.try_requires_grad()? && !other.try_requires_grad()? {
            return Ok(None);
        }
        collect_next_edges(&[self, other]).map(Some)
    }

    fn rebase_history(&self, node: Arc<dyn Node>) -> Result<()> {
        let inner = self.try_impl()?;
        let Some(view) = inner.view_meta() else {
            return self.set_history(node, 0);
        };
        let base = &view.base;
        let copy_slices = CopySlices::new(
            base.try_gradient_edge()?,
            base.layout().clone(),
            inner.layout().clone(),
            node,
        );
        base.set_history(Arc::new(copy_slices), 0)
    }
}
