pub mod engine;
pub mod forward;
pub mod functions;
pub mod hooks;
pub mod node;

pub use engine::BackwardOptions;
pub use forward::{enter_dual_level, exit_dual_level, is_dual_level_active, ForwardGrad};
pub use hooks::{Hook, HookList, HookOutput};
pub use node::{collect_next_edges, Edge, Node, NodeMeta, PreHook, SavedTensor};

use crate::{options::GradMode, tensor_impl::TensorImpl, Tensor};
use functions::{AccumulateGrad, AsStridedBackward};
use handlex_core::{
    error::{Error, Result},
    layout::Layout,
};
use node::node_key;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace};

/// Gradient bookkeeping attached to a [`TensorImpl`], created on first use.
#[derive(Default)]
pub struct AutogradMeta {
    pub(crate) requires_grad: bool,
    pub(crate) grad: Tensor,
    pub(crate) grad_fn: Option<Arc<dyn Node>>,
    pub(crate) output_nr: usize,
    pub(crate) hooks: Arc<Mutex<HookList>>,
    /// Node the hook list is currently installed on as a pre-hook.
    pub(crate) hooks_node: Option<usize>,
    pub(crate) retains_grad: bool,
    pub(crate) retain_node: Option<usize>,
    pub(crate) grad_accumulator: Weak<AccumulateGrad>,
    pub(crate) fw_grad: Option<Arc<ForwardGrad>>,
    /// Version at which a view's grad_fn was last derived from its base.
    pub(crate) attr_version: Option<u64>,
}

// ────────────────────────────────────────────────────────────────────────────
//  Meta access
// ────────────────────────────────────────────────────────────────────────────

impl Tensor {
    pub(crate) fn meta_read<R>(&self, f: impl FnOnce(Option<&AutogradMeta>) -> R) -> Result<R> {
        let guard = self.try_impl()?.autograd()?;
        Ok(f(guard.as_ref()))
    }

    pub(crate) fn meta_mut<R>(&self, f: impl FnOnce(&mut AutogradMeta) -> R) -> Result<R> {
        let mut guard = self.try_impl()?.autograd()?;
        Ok(f(guard.get_or_insert_with(AutogradMeta::default)))
    }

    fn own_requires_grad(&self) -> Result<bool> {
        self.meta_read(|m| m.is_some_and(|m| m.requires_grad))
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Requires-grad, leaf and graph position
// ────────────────────────────────────────────────────────────────────────────

/// ## Gradient tracking state
///
/// * `requires_grad` / `set_requires_grad` – the tracking flag
/// * `is_leaf`, `grad_fn`, `output_nr` – position in the recorded graph
/// * `version` – in-place mutation counter, shared with views
///
/// A tensor requires grad when its own flag is set or when it was produced by a
/// recorded operation.
impl Tensor {
    pub fn try_requires_grad(&self) -> Result<bool> {
        if self.own_requires_grad()? {
            return Ok(true);
        }
        Ok(self.try_grad_fn()?.is_some())
    }

    pub fn requires_grad(&self) -> bool {
        self.try_requires_grad().expect("failed to read requires_grad")
    }

    /// Turns gradient tracking on or off. Setting the current value again is a no-op,
    /// and turning tracking off keeps any accumulated gradient.
    ///
    /// # Errors
    ///
    /// * [`Error::RequiresGrad`] when enabling on a non-floating dtype, or when disabling
    ///   on a non-leaf
    pub fn try_set_requires_grad(&self, requires_grad: bool) -> Result<()> {
        let inner = self.try_impl()?;
        if requires_grad && !inner.dtype().is_float() {
            return Err(Error::RequiresGrad(format!(
                "only tensors of floating point dtype can require gradients, got {}",
                inner.dtype().as_str()
            )));
        }
        if !requires_grad && !self.try_is_leaf()? {
            return Err(Error::RequiresGrad(
                "you can only change requires_grad flags of leaf tensors; use detach() to get a non-tracking alias of a computed tensor".into(),
            ));
        }
        self.meta_mut(|m| m.requires_grad = requires_grad)
    }

    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.try_set_requires_grad(requires_grad)
            .expect("failed to set requires_grad")
    }

    /// The node that produced this tensor, or `None` for a leaf.
    ///
    /// For a differentiable view whose base requires grad, the node is re-derived from
    /// the base whenever the shared version counter has moved since it was last built.
    pub fn try_grad_fn(&self) -> Result<Option<Arc<dyn Node>>> {
        let inner = self.try_impl()?;
        if let Some(view) = inner.view_meta() {
            if view.differentiable && view.base.try_requires_grad()? {
                let current = inner.version_counter().current();
                let cached = self.meta_read(|m| {
                    m.filter(|m| m.attr_version == Some(current))
                        .and_then(|m| m.grad_fn.clone())
                })?;
                if cached.is_some() {
                    return Ok(cached);
                }
                return self.regenerate_view_grad_fn(current).map(Some);
            }
        }
        self.meta_read(|m| m.and_then(|m| m.grad_fn.clone()))
    }

    pub fn grad_fn(&self) -> Option<Arc<dyn Node>> {
        self.try_grad_fn().expect("failed to read grad_fn")
    }

    fn regenerate_view_grad_fn(&self, version: u64) -> Result<Arc<dyn Node>> {
        let inner = self.try_impl()?;
        let base = &inner
            .view_meta()
            .ok_or(Error::NotAView)?
            .base;
        let base_edge = base.try_gradient_edge()?;
        let node: Arc<dyn Node> = Arc::new(AsStridedBackward::new(
            base_edge,
            base.layout().clone(),
            inner.layout().clone(),
        ));
        self.meta_mut(|m| {
            m.grad_fn = Some(node.clone());
            m.output_nr = 0;
            m.attr_version = Some(version);
        })?;
        self.try_attach_tensor_hooks(&node)?;
        trace!(node = node.name(), version, "regenerated view grad_fn");
        Ok(node)
    }

    pub fn try_is_leaf(&self) -> Result<bool> {
        Ok(self.try_grad_fn()?.is_none())
    }

    pub fn is_leaf(&self) -> bool {
        self.try_is_leaf().expect("failed to read is_leaf")
    }

    pub fn output_nr(&self) -> usize {
        self.meta_read(|m| m.map_or(0, |m| m.output_nr))
            .expect("failed to read output_nr")
    }

    /// The in-place mutation counter shared by this tensor and all of its aliases.
    pub fn version(&self) -> u64 {
        self.inner().version_counter().current()
    }

    /// Where a gradient flowing into this tensor goes: its grad_fn, its accumulator if
    /// it is a leaf that requires grad, or nowhere.
    pub fn try_gradient_edge(&self) -> Result<Edge> {
        if let Some(grad_fn) = self.try_grad_fn()? {
            let output_nr = self.meta_read(|m| m.map_or(0, |m| m.output_nr))?;
            return Ok(Edge::new(grad_fn, output_nr));
        }
        if self.own_requires_grad()? {
            return Ok(Edge::new(self.try_grad_accumulator()?, 0));
        }
        Ok(Edge::default())
    }

    /// The leaf's accumulator node, created on demand and cached weakly.
    pub(crate) fn try_grad_accumulator(&self) -> Result<Arc<dyn Node>> {
        let tensor = self.clone();
        let acc = self.meta_mut(move |m| match m.grad_accumulator.upgrade() {
            Some(acc) => acc,
            None => {
                let acc = Arc::new(AccumulateGrad::new(tensor));
                m.grad_accumulator = Arc::downgrade(&acc);
                acc
            },
        })?;
        Ok(acc)
    }

    /// Records `node` as the producer of this tensor.
    pub(crate) fn set_history(&self, node: Arc<dyn Node>, output_nr: usize) -> Result<()> {
        self.meta_mut(|m| {
            m.grad_fn = Some(node.clone());
            m.output_nr = output_nr;
        })?;
        self.try_attach_tensor_hooks(&node)
    }

    /// Installs this tensor's hook list and retain-grad hook on `node` if they are not
    /// already there.
    fn try_attach_tensor_hooks(&self, node: &Arc<dyn Node>) -> Result<()> {
        let key = node_key(node);
        let weak = self.downgrade();
        let pending = self.meta_mut(|m| -> Result<Vec<PreHook>> {
            let mut pending = Vec::new();
            let has_hooks = !m.hooks.lock().map_err(|_| Error::Lock)?.is_empty();
            if has_hooks && m.hooks_node != Some(key) {
                pending.push(PreHook::Tensor {
                    output_nr: m.output_nr,
                    hooks: m.hooks.clone(),
                });
                m.hooks_node = Some(key);
            }
            if m.retains_grad && m.retain_node != Some(key) {
                pending.push(PreHook::RetainGrad {
                    output_nr: m.output_nr,
                    tensor: weak,
                });
                m.retain_node = Some(key);
            }
            Ok(pending)
        })??;
        for hook in pending {
            node.meta().add_pre_hook(hook)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Accumulated gradient
// ────────────────────────────────────────────────────────────────────────────

/// ## Accumulated gradient
///
/// `grad` starts empty. Each backward pass adds into it; it is only replaced through
/// `set_grad` or cleared through `reset_grad`.
impl Tensor {
    pub fn try_grad(&self) -> Result<Tensor> {
        self.meta_read(|m| m.map(|m| m.grad.clone()).unwrap_or_default())
    }

    pub fn grad(&self) -> Tensor {
        self.try_grad().expect("failed to read grad")
    }

    pub fn try_set_grad(&self, grad: Tensor) -> Result<()> {
        if grad.is_defined() {
            self.check_grad_compatible(&grad)?;
        }
        self.meta_mut(|m| m.grad = grad)
    }

    pub fn set_grad(&self, grad: Tensor) {
        self.try_set_grad(grad).expect("failed to set grad")
    }

    pub fn try_reset_grad(&self) -> Result<()> {
        self.meta_mut(|m| m.grad.reset())
    }

    pub fn reset_grad(&self) {
        self.try_reset_grad().expect("failed to reset grad")
    }

    /// Runs `f` on the stored gradient slot.
    ///
    /// Not synchronized with a concurrent backward pass writing the same slot. `f` runs
    /// with this tensor's autograd lock held and must not call back into this tensor's
    /// gradient API.
    pub fn try_with_mutable_grad<R>(&self, f: impl FnOnce(&mut Tensor) -> R) -> Result<R> {
        self.meta_mut(|m| f(&mut m.grad))
    }

    pub fn with_mutable_grad<R>(&self, f: impl FnOnce(&mut Tensor) -> R) -> R {
        self.try_with_mutable_grad(f).expect("failed to access grad")
    }

    fn check_grad_compatible(&self, grad: &Tensor) -> Result<()> {
        let inner = self.try_impl()?;
        let grad_inner = grad.try_impl()?;
        if grad_inner.layout().shape() != inner.layout().shape() {
            return Err(Error::DimensionMismatch {
                expected: inner.layout().shape().to_vec(),
                got: grad_inner.layout().shape().to_vec(),
            });
        }
        if grad_inner.dtype() != inner.dtype() {
            return Err(Error::DTypeMismatch {
                expected: inner.dtype(),
                got: grad_inner.dtype(),
            });
        }
        if grad_inner.device() != inner.device() {
            return Err(Error::DeviceMismatch {
                expected: inner.device(),
                got: grad_inner.device(),
            });
        }
        Ok(())
    }

    /// Adds `incoming` into the stored gradient, or stores it if the slot is empty.
    ///
    /// Requires-grad, shape, dtype and device are checked before anything is written. A
    /// tensor that no longer requires grad keeps its gradient frozen. A uniquely owned
    /// `incoming` is stored as is; a shared one is copied first, so a later in-place
    /// accumulation never writes through another handle.
    pub fn try_accumulate_grad(&self, incoming: Tensor) -> Result<()> {
        self.accumulate_grad_with(incoming, GradMode::DISABLED)
    }

    pub fn accumulate_grad(&self, incoming: Tensor) {
        self.try_accumulate_grad(incoming)
            .expect("failed to accumulate grad")
    }

    /// With `mode` enabled the stored gradient keeps its history and sums are formed
    /// out of place, so the result can itself be differentiated.
    pub(crate) fn accumulate_grad_with(&self, incoming: Tensor, mode: GradMode) -> Result<()> {
        if !incoming.is_defined() {
            return Err(Error::InvalidArgument("cannot accumulate an undefined gradient".into()));
        }
        if !self.try_requires_grad()? {
            return Err(Error::RequiresGrad(
                "cannot accumulate a gradient into a tensor that does not require grad".into(),
            ));
        }
        self.check_grad_compatible(&incoming)?;

        let existing = self.try_grad()?;
        if !existing.is_defined() {
            let stored = if mode.is_enabled() {
                incoming.copy_with_history(mode, self.grad_layout())?
            } else {
                self.gradient_for_storage(incoming)?
            };
            self.meta_mut(|m| m.grad = stored)?;
            trace!("stored first gradient");
        } else if mode.is_enabled() || !self.accepts_in_place_grad(&existing)? {
            let sum = existing.try_add_with(mode, &incoming)?;
            self.meta_mut(|m| m.grad = sum)?;
            trace!("accumulated gradient out of place");
        } else {
            existing.raw_add_assign(&incoming)?;
            trace!("accumulated gradient in place");
        }
        Ok(())
    }

    /// Only a plain, untracked gradient laid out like this tensor is summed in place.
    fn accepts_in_place_grad(&self, existing: &Tensor) -> Result<bool> {
        Ok(!existing.is_view()
            && existing.try_grad_fn()?.is_none()
            && !existing.own_requires_grad()?
            && self.obeys_grad_layout(existing))
    }

    /// `incoming` itself when nothing else can observe it and its strides suit this
    /// tensor, otherwise a detached copy laid out like this tensor.
    fn gradient_for_storage(&self, incoming: Tensor) -> Result<Tensor> {
        let unique = incoming.use_count() == 1
            && !incoming.is_view()
            && incoming
                .try_impl()?
                .storage()
                .is_some_and(|s| s.use_count() == 1);
        if unique && self.obeys_grad_layout(&incoming) {
            return if incoming.own_requires_grad()? || incoming.try_grad_fn()?.is_some() {
                incoming.try_detach()
            } else {
                Ok(incoming)
            };
        }
        incoming.raw_clone_into(self.grad_layout())
    }

    fn grad_layout(&self) -> Layout {
        let layout = self.layout();
        if layout.is_non_overlapping_and_dense() {
            Layout::new(layout.shape(), layout.strides(), 0).unwrap_or_else(|_| Layout::from_shape(layout.shape()))
        } else {
            Layout::from_shape(layout.shape())
        }
    }

    fn obeys_grad_layout(&self, grad: &Tensor) -> bool {
        let layout = self.layout();
        if layout.is_non_overlapping_and_dense() {
            grad.is_non_overlapping_and_dense()
                && layout
                    .shape()
                    .iter()
                    .zip(layout.strides().iter().zip(grad.strides()))
                    .all(|(&size, (a, b))| size < 2 || a == b)
        } else {
            grad.is_contiguous()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Hooks
// ────────────────────────────────────────────────────────────────────────────

/// ## Gradient hooks
///
/// Hooks run synchronously, in registration order, every time a gradient reaches this
/// tensor during backward. Each receives the gradient produced by the previous hook and
/// may return a replacement, or `()` / `None` to pass it through.
///
/// ```ignore
/// let x = Tensor::ones(&[2]);
/// x.set_requires_grad(true);
/// let id = x.register_hook(|g: &Tensor| g.mul_scalar(2.0));
/// x.remove_hook(id);
/// ```
impl Tensor {
    /// Appends a hook and returns its removal token.
    ///
    /// # Errors
    ///
    /// * [`Error::RequiresGrad`] if this tensor does not require grad
    pub fn try_register_hook<F, R>(&self, hook: F) -> Result<usize>
    where
        F: Fn(&Tensor) -> R + Send + Sync + 'static,
        R: HookOutput,
    {
        if !self.try_requires_grad()? {
            return Err(Error::RequiresGrad(
                "cannot register a hook on a tensor that doesn't require gradient".into(),
            ));
        }
        let erased = hooks::erase(hook);
        let id = self.meta_mut(|m| -> Result<usize> { Ok(m.hooks.lock().map_err(|_| Error::Lock)?.push(erased)) })??;
        if let Some(node) = self.try_grad_fn()? {
            self.try_attach_tensor_hooks(&node)?;
        }
        debug!(hook_id = id, "registered gradient hook");
        Ok(id)
    }

    pub fn register_hook<F, R>(&self, hook: F) -> usize
    where
        F: Fn(&Tensor) -> R + Send + Sync + 'static,
        R: HookOutput,
    {
        self.try_register_hook(hook).expect("failed to register hook")
    }

    /// # Errors
    ///
    /// * [`Error::InvalidHook`] if `id` was never handed out or was already removed
    pub fn try_remove_hook(&self, id: usize) -> Result<()> {
        let hooks = self
            .meta_read(|m| m.map(|m| m.hooks.clone()))?
            .ok_or(Error::InvalidHook { id })?;
        hooks.lock().map_err(|_| Error::Lock)?.remove(id)?;
        debug!(hook_id = id, "removed gradient hook");
        Ok(())
    }

    /// # Panics
    ///
    /// * When `id` is not a live hook token
    pub fn remove_hook(&self, id: usize) {
        self.try_remove_hook(id).expect("failed to remove hook")
    }

    /// The live hooks, in order.
    pub(crate) fn hook_snapshot(&self) -> Result<Vec<Hook>> {
        let hooks = self.meta_read(|m| m.map(|m| m.hooks.clone()))?;
        match hooks {
            Some(hooks) => Ok(hooks.lock().map_err(|_| Error::Lock)?.snapshot()),
            None => Ok(Vec::new()),
        }
    }

    /// Keeps the gradient that flows into this non-leaf tensor in its `grad`. A no-op on
    /// leaves, which keep their gradient anyway.
    pub fn try_retain_grad(&self) -> Result<()> {
        if !self.try_requires_grad()? {
            return Err(Error::RequiresGrad(
                "can't retain_grad on a tensor that doesn't require gradient".into(),
            ));
        }
        let Some(node) = self.try_grad_fn()? else {
            return Ok(());
        };
        self.meta_mut(|m| m.retains_grad = true)?;
        self.try_attach_tensor_hooks(&node)
    }

    pub fn retain_grad(&self) {
        self.try_retain_grad().expect("failed to retain grad")
    }

    pub fn retains_grad(&self) -> bool {
        self.meta_read(|m| m.is_some_and(|m| m.retains_grad))
            .expect("failed to read retains_grad")
    }

    /// Applied by the engine when a retained gradient reaches this tensor.
    pub(crate) fn retain_incoming(&self, grad: &Tensor, mode: GradMode) -> Result<()> {
        if !grad.is_defined() {
            return Ok(());
        }
        let existing = self.try_grad()?;
        let updated = if existing.is_defined() {
            existing.try_add_with(mode, grad)?
        } else {
            grad.copy_with_history(mode, Layout::from_shape(grad.sizes()))?
        };
        self.meta_mut(|m| m.grad = updated)
    }
}

// ────────────────────────────────────────────────────────────────────────────
//  Views and detaching
// ────────────────────────────────────────────────────────────────────────────

impl Tensor {
    pub fn is_view(&self) -> bool {
        self.inner().view_meta().is_some()
    }

    /// The tensor whose storage this view reads.
    ///
    /// # Errors
    ///
    /// * [`Error::NotAView`] if this tensor is not a view
    pub fn try_base(&self) -> Result<Tensor> {
        self.try_impl()?
            .view_meta()
            .map(|view| view.base.clone())
            .ok_or(Error::NotAView)
    }

    pub fn base(&self) -> Tensor {
        self.try_base().expect("failed to get base of tensor")
    }

    /// A non-tracking alias sharing storage and version counter with `self`.
    pub fn try_detach(&self) -> Result<Tensor> {
        let inner = self.try_impl()?;
        let alias = TensorImpl::new_alias(inner, inner.layout().clone(), None)?;
        Ok(Tensor::from_impl(alias))
    }

    pub fn detach(&self) -> Tensor {
        self.try_detach().expect("failed to detach tensor")
    }

    /// Drops this tensor's history and gradient tracking in place.
    ///
    /// # Errors
    ///
    /// * [`Error::RequiresGrad`] on a view; views share history with their base and can
    ///   only be detached out of place
    pub fn try_detach_(&self) -> Result<()> {
        if self.try_impl()?.view_meta().is_some() {
            return Err(Error::RequiresGrad(
                "can't detach views in-place; use detach() instead".into(),
            ));
        }
        self.meta_mut(|m| {
            m.requires_grad = false;
            m.grad_fn = None;
            m.output_nr = 0;
        })
    }

    pub fn detach_(&self) {
        self.try_detach_().expect("failed to detach tensor in place")
    }
}
