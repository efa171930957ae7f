use super::hooks::HookList;
use crate::{options::GradMode, Tensor, WeakTensor};
use handlex_core::error::{Error, Result};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

static SEQUENCE_NR: AtomicU64 = AtomicU64::new(0);

#[inline]
pub(crate) fn next_sequence_nr() -> u64 {
    SEQUENCE_NR.fetch_add(1, Ordering::Relaxed)
}

/// A backward function in the recorded graph.
///
/// `apply` receives one gradient per forward output (undefined for outputs that got
/// none) and returns one gradient per entry of [`NodeMeta::next_edges`].
pub trait Node: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, grads: Vec<Tensor>, mode: GradMode) -> Result<Vec<Tensor>>;

    fn meta(&self) -> &NodeMeta;

    /// Frees saved tensors once the graph will not be traversed again.
    fn release_variables(&self) {}

    /// The leaf this node accumulates into, for [`AccumulateGrad`](super::functions::AccumulateGrad).
    fn accumulated_variable(&self) -> Option<&Tensor> {
        None
    }
}

/// Identity of a node for bookkeeping maps.
#[inline]
pub(crate) fn node_key(node: &Arc<dyn Node>) -> usize {
    Arc::as_ptr(node) as *const () as usize
}

/// Where a gradient goes next: input slot `input_nr` of `function`.
#[derive(Clone, Default)]
pub struct Edge {
    pub function: Option<Arc<dyn Node>>,
    pub input_nr: usize,
}

impl Edge {
    pub fn new(function: Arc<dyn Node>, input_nr: usize) -> Self {
        Self {
            function: Some(function),
            input_nr,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.function.is_some()
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.function {
            Some(func) => write!(f, "Edge({}, {})", func.name(), self.input_nr),
            None => write!(f, "Edge(None)"),
        }
    }
}

/// Work done on a node's incoming gradient before `apply`.
#[derive(Clone)]
pub enum PreHook {
    /// The user hooks of the tensor that is output `output_nr` of this node.
    Tensor {
        output_nr: usize,
        hooks: Arc<Mutex<HookList>>,
    },
    /// Stores the incoming gradient into a non-leaf tensor's `grad`.
    RetainGrad { output_nr: usize, tensor: WeakTensor },
}

impl PreHook {
    pub fn output_nr(&self) -> usize {
        match self {
            Self::Tensor { output_nr, .. } | Self::RetainGrad { output_nr, .. } => *output_nr,
        }
    }
}

pub struct NodeMeta {
    next_edges: Vec<Edge>,
    pre_hooks: Mutex<Vec<PreHook>>,
    sequence_nr: u64,
    num_inputs: usize,
}

impl NodeMeta {
    pub fn new(next_edges: Vec<Edge>, num_inputs: usize) -> Self {
        Self::with_sequence_nr(next_edges, num_inputs, next_sequence_nr())
    }

    pub fn with_sequence_nr(next_edges: Vec<Edge>, num_inputs: usize, sequence_nr: u64) -> Self {
        Self {
            next_edges,
            pre_hooks: Mutex::new(Vec::new()),
            sequence_nr,
            num_inputs,
        }
    }

    pub fn next_edges(&self) -> &[Edge] {
        &self.next_edges
    }

    pub fn next_edge(&self, i: usize) -> Option<&Edge> {
        self.next_edges.get(i)
    }

    /// Whether output `i` of `apply` is consumed by anything.
    pub fn needs_input_grad(&self, i: usize) -> bool {
        self.next_edges.get(i).is_some_and(Edge::is_valid)
    }

    pub fn sequence_nr(&self) -> u64 {
        self.sequence_nr
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn add_pre_hook(&self, hook: PreHook) -> Result<()> {
        self.pre_hooks.lock().map_err(|_| Error::Lock)?.push(hook);
        Ok(())
    }

    pub fn pre_hooks(&self) -> Result<Vec<PreHook>> {
        Ok(self.pre_hooks.lock().map_err(|_| Error::Lock)?.clone())
    }
}

/// A tensor captured for backward, pinned to the version it had when saved.
pub struct SavedTensor {
    name: &'static str,
    data: Mutex<Option<Tensor>>,
    saved_version: u64,
}

impl SavedTensor {
    pub fn new(name: &'static str, tensor: &Tensor) -> Self {
        Self {
            name,
            data: Mutex::new(Some(tensor.clone())),
            saved_version: tensor.version(),
        }
    }

    pub fn unpack(&self, node: &str) -> Result<Tensor> {
        let guard = self.data.lock().map_err(|_| Error::Lock)?;
        let tensor = guard.as_ref().ok_or_else(|| Error::GraphReleased { node: node.to_string() })?;
        let current_version = tensor.version();
        if current_version != self.saved_version {
            return Err(Error::SavedTensorModified {
                name: self.name,
                saved_version: self.saved_version,
                current_version,
            });
        }
        Ok(tensor.clone())
    }

    pub fn release(&self) {
        if let Ok(mut guard) = self.data.lock() {
            guard.take();
        }
    }
}

/// Gradient edges of `tensors`, in order. Tensors that don't require grad get an
/// invalid edge.
pub fn collect_next_edges(tensors: &[&Tensor]) -> Result<Vec<Edge>> {
    tensors.iter().map(|t| t.try_gradient_edge()).collect()
}
