use super::{
    hooks::run_hooks,
    node::{Edge, Node, NodeMeta, SavedTensor},
};
use crate::{options::GradMode, Tensor};
use handlex_core::{
    error::{Error, Result},
    layout::Layout,
};
use std::sync::Arc;

fn first_grad(grads: Vec<Tensor>) -> Tensor {
    grads.into_iter().next().unwrap_or_default()
}

fn undefined(n: usize) -> Vec<Tensor> {
    vec![Tensor::default(); n]
}

// ────────────────────────────────────────────────────────────────────────────
//  AccumulateGrad
// ────────────────────────────────────────────────────────────────────────────

/// Sink node of a leaf: runs the leaf's hooks, then adds into its `grad`.
pub struct AccumulateGrad {
    meta: NodeMeta,
    variable: Tensor,
}

impl AccumulateGrad {
    pub fn new(variable: Tensor) -> Self {
        Self {
            // Accumulators run as soon as they are ready.
            meta: NodeMeta::with_sequence_nr(Vec::new(), 1, u64::MAX),
            variable,
        }
    }
}

impl Node for AccumulateGrad {
    fn name(&self) -> &'static str {
        "AccumulateGrad"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let grad = first_grad(grads);
        if !grad.is_defined() || !self.variable.try_requires_grad()? {
            return Ok(Vec::new());
        }
        let hooks = self.variable.hook_snapshot()?;
        let grad = run_hooks(&hooks, grad)?;
        self.variable.accumulate_grad_with(grad, mode)?;
        Ok(Vec::new())
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn accumulated_variable(&self) -> Option<&Tensor> {
        Some(&self.variable)
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Arithmetic
// ────────────────────────────────────────────────────────────────────────────

/// `out = lhs + rhs`, also used for in-place `lhs += rhs`.
pub struct AddBackward {
    meta: NodeMeta,
}

impl AddBackward {
    pub fn new(next_edges: Vec<Edge>) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
        }
    }
}

impl Node for AddBackward {
    fn name(&self) -> &'static str {
        "AddBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, _mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        let pass = |i: usize| {
            if self.meta.needs_input_grad(i) {
                g.clone()
            } else {
                Tensor::default()
            }
        };
        Ok(vec![pass(0), pass(1)])
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

pub struct MulBackward {
    meta: NodeMeta,
    lhs: SavedTensor,
    rhs: SavedTensor,
}

impl MulBackward {
    pub fn new(next_edges: Vec<Edge>, lhs: &Tensor, rhs: &Tensor) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
            lhs: SavedTensor::new("self", lhs),
            rhs: SavedTensor::new("other", rhs),
        }
    }
}

impl Node for MulBackward {
    fn name(&self) -> &'static str {
        "MulBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        let mut out = undefined(2);
        if !g.is_defined() {
            return Ok(out);
        }
        if self.meta.needs_input_grad(0) {
            let rhs = self.rhs.unpack(self.name())?;
            out[0] = g.try_mul_with(mode, &rhs)?;
        }
        if self.meta.needs_input_grad(1) {
            let lhs = self.lhs.unpack(self.name())?;
            out[1] = g.try_mul_with(mode, &lhs)?;
        }
        Ok(out)
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn release_variables(&self) {
        self.lhs.release();
        self.rhs.release();
    }
}

pub struct MulScalarBackward {
    meta: NodeMeta,
    scalar: f64,
}

impl MulScalarBackward {
    pub fn new(next_edges: Vec<Edge>, scalar: f64) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
            scalar,
        }
    }
}

impl Node for MulScalarBackward {
    fn name(&self) -> &'static str {
        "MulScalarBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        if !g.is_defined() || !self.meta.needs_input_grad(0) {
            return Ok(undefined(1));
        }
        Ok(vec![g.try_mul_scalar_with(mode, self.scalar)?])
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

/// Full reduction; the scalar gradient is broadcast back over the input shape.
pub struct SumBackward {
    meta: NodeMeta,
    shape: Vec<usize>,
}

impl SumBackward {
    pub fn new(next_edges: Vec<Edge>, shape: &[usize]) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
            shape: shape.to_vec(),
        }
    }
}

impl Node for SumBackward {
    fn name(&self) -> &'static str {
        "SumBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        if !g.is_defined() || !self.meta.needs_input_grad(0) {
            return Ok(undefined(1));
        }
        let zeros = vec![0; self.shape.len()];
        let expanded = g.try_as_strided_with(mode, &self.shape, &zeros, g.storage_offset())?;
        Ok(vec![expanded])
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Copies
// ────────────────────────────────────────────────────────────────────────────

/// Out-of-place copy (`clone_tensor`, `contiguous`): the gradient passes through.
pub struct CloneBackward {
    meta: NodeMeta,
}

impl CloneBackward {
    pub fn new(next_edges: Vec<Edge>) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
        }
    }
}

impl Node for CloneBackward {
    fn name(&self) -> &'static str {
        "CloneBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, _mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        if !self.meta.needs_input_grad(0) {
            return Ok(undefined(1));
        }
        Ok(vec![g])
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

/// In-place `dst.copy_(src)`. The overwritten values of `dst` get no gradient.
pub struct CopyBackward {
    meta: NodeMeta,
}

impl CopyBackward {
    pub fn new(next_edges: Vec<Edge>) -> Self {
        Self {
            meta: NodeMeta::new(next_edges, 1),
        }
    }
}

impl Node for CopyBackward {
    fn name(&self) -> &'static str {
        "CopyBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, _mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        let mut out = undefined(2);
        if self.meta.needs_input_grad(1) {
            out[1] = g;
        }
        Ok(out)
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Views
// ────────────────────────────────────────────────────────────────────────────

/// Backward of any strided view of a base.
///
/// Both geometries are in absolute storage coordinates. The gradient is scattered into
/// a zeroed buffer through the view's geometry (summing where the view aliases one
/// element several times) and gathered back through the base's geometry.
pub struct AsStridedBackward {
    meta: NodeMeta,
    input_geometry: Layout,
    output_geometry: Layout,
}

impl AsStridedBackward {
    pub fn new(base_edge: Edge, input_geometry: Layout, output_geometry: Layout) -> Self {
        Self {
            meta: NodeMeta::new(vec![base_edge], 1),
            input_geometry,
            output_geometry,
        }
    }
}

impl Node for AsStridedBackward {
    fn name(&self) -> &'static str {
        "AsStridedBackward"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let g = first_grad(grads);
        if !g.is_defined() || !self.meta.needs_input_grad(0) {
            return Ok(undefined(1));
        }
        let (input, output) = (&self.input_geometry, &self.output_geometry);
        if input == output && input.is_non_overlapping_and_dense() {
            return Ok(vec![g]);
        }

        let extent = input.storage_extent().max(output.storage_extent());
        let buffer = Tensor::try_zeros_with_spec(&[extent], g.device(), g.dtype())?;
        let scatter = buffer.try_as_strided_with(mode, output.shape(), output.strides(), output.offset())?;
        scatter.try_add_inplace_with(mode, &g)?;
        let gathered = buffer.try_as_strided_with(mode, input.shape(), input.strides(), input.offset())?;
        Ok(vec![gathered.try_contiguous_with(mode)?])
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }
}

/// Rewrites a base's history after an in-place operation on one of its views.
///
/// `fn_` is the backward of the in-place op as applied to the view; its first output is
/// written back into the view's region of the base gradient, the rest pass through.
pub struct CopySlices {
    meta: NodeMeta,
    base_geometry: Layout,
    view_geometry: Layout,
    fn_: Arc<dyn Node>,
}

impl CopySlices {
    pub fn new(base_edge: Edge, base_geometry: Layout, view_geometry: Layout, fn_: Arc<dyn Node>) -> Self {
        let mut next_edges = vec![base_edge];
        next_edges.extend(fn_.meta().next_edges().iter().skip(1).cloned());
        Self {
            meta: NodeMeta::new(next_edges, 1),
            base_geometry,
            view_geometry,
            fn_,
        }
    }
}

impl Node for CopySlices {
    fn name(&self) -> &'static str {
        "CopySlices"
    }

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>> {
        let num_outputs = self.meta.next_edges().len();
        let g = first_grad(grads);
        if !g.is_defined() {
            return Ok(undefined(num_outputs));
        }

        let (base, view) = (&self.base_geometry, &self.view_geometry);
        let view_offset = view.offset().checked_sub(base.offset()).ok_or_else(|| {
            Error::InvalidState(format!(
                "view offset {} lies before its base offset {}",
                view.offset(),
                base.offset()
            ))
        })?;

        let result = Tensor::try_empty_strided_with_spec(base.shape(), base.strides(), g.device(), g.dtype())?;
        result.try_copy_inplace_with(mode, &g)?;
        let grad_slice = result.try_as_strided_with(mode, view.shape(), view.strides(), view_offset)?;
        let res = self.fn_.apply(vec![grad_slice.try_clone_tensor_with(mode)?], mode)?;

        let mut out = undefined(num_outputs);
        for (i, r) in res.into_iter().enumerate().take(num_outputs) {
            if i == 0 {
                if r.is_defined() {
                    grad_slice.try_copy_inplace_with(mode, &r)?;
                } else {
                    grad_slice.raw_fill(0.0)?;
                }
                out[0] = result.clone();
            } else if self.meta.needs_input_grad(i) {
                out[i] = r;
            }
        }
        Ok(out)
    }

    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn release_variables(&self) {
        self.fn_.release_variables();
    }
}
