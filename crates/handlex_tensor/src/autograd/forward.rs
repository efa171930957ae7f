use crate::Tensor;
use dashmap::DashMap;
use handlex_core::{
    error::{Error, Result},
    layout::Layout,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, LazyLock, Mutex, Weak,
    },
};
use tracing::{debug, trace, warn};

static NEXT_LEVEL: AtomicU64 = AtomicU64::new(0);

/// Forward grads registered under each active level, so that leaving the level can clear
/// them wherever they live.
static ACTIVE_LEVELS: LazyLock<DashMap<u64, Vec<Weak<ForwardGrad>>>> =
    LazyLock::new(|| DashMap::with_capacity_and_shard_amount(1 << 4, 16));

/// Opens a new forward-mode level and returns its id.
pub fn enter_dual_level() -> u64 {
    let level = NEXT_LEVEL.fetch_add(1, Ordering::Relaxed);
    ACTIVE_LEVELS.insert(level, Vec::new());
    debug!(level, "entered dual level");
    level
}

/// Closes `level`, dropping every forward grad set at it.
pub fn exit_dual_level(level: u64) -> Result<()> {
    let Some((_, grads)) = ACTIVE_LEVELS.remove(&level) else {
        warn!(level, "exit requested for a dual level that is not active");
        return Ok(());
    };
    let mut cleared = 0usize;
    for grad in grads.iter().filter_map(Weak::upgrade) {
        if grad.reset(level)?.is_some() {
            cleared += 1;
        }
    }
    debug!(level, cleared, "exited dual level");
    Ok(())
}

pub fn is_dual_level_active(level: u64) -> bool {
    ACTIVE_LEVELS.contains_key(&level)
}

/// Per-level tangents of one tensor.
#[derive(Default)]
pub struct ForwardGrad {
    content: Mutex<HashMap<u64, Tensor>>,
}

impl ForwardGrad {
    pub fn value(&self, level: u64) -> Result<Tensor> {
        let content = self.content.lock().map_err(|_| Error::Lock)?;
        Ok(content.get(&level).cloned().unwrap_or_default())
    }

    pub fn contains(&self, level: u64) -> Result<bool> {
        Ok(self.content.lock().map_err(|_| Error::Lock)?.contains_key(&level))
    }

    fn set_value(&self, level: u64, value: Tensor) -> Result<()> {
        self.content.lock().map_err(|_| Error::Lock)?.insert(level, value);
        Ok(())
    }

    fn reset(&self, level: u64) -> Result<Option<Tensor>> {
        Ok(self.content.lock().map_err(|_| Error::Lock)?.remove(&level))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.content.lock().map_err(|_| Error::Lock)?.is_empty())
    }
}

fn register(grad: &Arc<ForwardGrad>, level: u64) -> Result<()> {
    let mut entry = ACTIVE_LEVELS
        .get_mut(&level)
        .ok_or_else(|| Error::InvalidState(format!("dual level {level} is not active")))?;
    entry.retain(|w| w.strong_count() > 0);
    if !entry.iter().any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(grad))) {
        entry.push(Arc::downgrade(grad));
    }
    Ok(())
}

/// ## Forward-mode gradients
///
/// A tensor holds at most one tangent per level. A view with no tangent of its own
/// reads its base's tangent through the view's geometry.
impl Tensor {
    fn forward_grad_slot(&self) -> Result<Arc<ForwardGrad>> {
        self.meta_mut(|m| m.fw_grad.get_or_insert_with(Default::default).clone())
    }

    fn own_fw_grad(&self, level: u64) -> Result<Tensor> {
        match self.meta_read(|m| m.and_then(|m| m.fw_grad.clone()))? {
            Some(grad) => grad.value(level),
            None => Ok(Tensor::default()),
        }
    }

    /// The tangent at `level`, or an empty handle.
    pub fn try_fw_grad(&self, level: u64) -> Result<Tensor> {
        let own = self.own_fw_grad(level)?;
        if own.is_defined() {
            return Ok(own);
        }
        let inner = self.try_impl()?;
        let Some(view) = inner.view_meta() else {
            return Ok(own);
        };
        let base_grad = view.base.own_fw_grad(level)?;
        if !base_grad.is_defined() || !is_dual_level_active(level) {
            return Ok(Tensor::default());
        }
        let layout = inner.layout();
        let view_grad = base_grad.try_as_strided(layout.shape(), layout.strides(), layout.offset())?;
        let slot = self.forward_grad_slot()?;
        slot.set_value(level, view_grad.clone())?;
        register(&slot, level)?;
        trace!(level, "derived view tangent from base");
        Ok(view_grad)
    }

    pub fn fw_grad(&self, level: u64) -> Tensor {
        self.try_fw_grad(level).expect("failed to read forward grad")
    }

    /// Sets the tangent at `level`.
    ///
    /// The stored tangent always has this tensor's strides and storage offset: a `value`
    /// laid out differently is copied into a fresh tensor of the right geometry instead of
    /// being aliased. With `is_inplace_op`, an existing tangent is updated in place, and
    /// a view without one first gives its base a zero tangent and takes a view of it.
    ///
    /// # Errors
    ///
    /// * `InvalidState` – `level` is not active, or a tangent is already set at `level`
    ///   and this is not an in-place op
    /// * `DimensionMismatch` / `DTypeMismatch` – `value` does not match this tensor
    pub fn try_set_fw_grad(&self, value: &Tensor, level: u64, is_inplace_op: bool) -> Result<()> {
        if !is_dual_level_active(level) {
            return Err(Error::InvalidState(format!("dual level {level} is not active")));
        }
        let inner = self.try_impl()?;
        let given = value.try_impl()?;
        if given.layout().shape() != inner.layout().shape() {
            return Err(Error::DimensionMismatch {
                expected: inner.layout().shape().to_vec(),
                got: given.layout().shape().to_vec(),
            });
        }
        if given.dtype() != inner.dtype() {
            return Err(Error::DTypeMismatch {
                expected: inner.dtype(),
                got: given.dtype(),
            });
        }

        let existing = self.try_fw_grad(level)?;
        if existing.is_defined() {
            if !is_inplace_op {
                return Err(Error::InvalidState(format!(
                    "a forward grad already exists at level {level}"
                )));
            }
            existing.raw_copy_from(value)?;
            trace!(level, "updated forward grad in place");
            return Ok(());
        }

        let stored = match inner.view_meta() {
            Some(view) if is_inplace_op => {
                let base = &view.base;
                let base_layout = base.layout();
                let base_grad =
                    Tensor::try_zeros_strided_with_spec(base_layout, base.device(), base.dtype())?;
                let base_slot = base.forward_grad_slot()?;
                base_slot.set_value(level, base_grad.clone())?;
                register(&base_slot, level)?;
                let layout = inner.layout();
                let view_grad = base_grad.try_as_strided(layout.shape(), layout.strides(), layout.offset())?;
                view_grad.raw_copy_from(value)?;
                view_grad
            },
            _ => self.tangent_like_self(value)?,
        };

        let slot = self.forward_grad_slot()?;
        slot.set_value(level, stored)?;
        register(&slot, level)?;
        debug!(level, is_inplace_op, "set forward grad");
        Ok(())
    }

    pub fn set_fw_grad(&self, value: &Tensor, level: u64, is_inplace_op: bool) {
        self.try_set_fw_grad(value, level, is_inplace_op)
            .expect("failed to set forward grad")
    }

    /// `value` itself when its geometry matches this tensor's, else a copy that does.
    fn tangent_like_self(&self, value: &Tensor) -> Result<Tensor> {
        let own = self.layout();
        let given = value.layout();
        let own_len = self.try_impl()?.storage().map(|s| s.len());
        let given_len = value.try_impl()?.storage().map(|s| s.len());
        if own.strides() == given.strides() && own.offset() == given.offset() && own_len == given_len {
            return Ok(value.clone());
        }
        let layout = Layout::new(own.shape(), own.strides(), own.offset())?;
        let len = own_len.unwrap_or_else(|| layout.storage_extent());
        let tangent = Tensor::try_empty_with_layout(layout, len, self.device(), self.dtype())?;
        tangent.raw_copy_from(value)?;
        Ok(tangent)
    }
}
