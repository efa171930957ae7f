use super::{
    hooks::run_hooks,
    node::{node_key, Edge, Node, PreHook},
};
use crate::{options::GradMode, Tensor};
use handlex_core::error::{Error, Result};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, trace};

/// Arguments of [`Tensor::backward`].
///
/// ```ignore
/// loss.backward(BackwardOptions::new().retain_graph(true));
/// y.backward(BackwardOptions::new().gradient(Tensor::ones(&[3])).inputs(vec![x.clone()]));
/// ```
#[derive(Clone, Default)]
pub struct BackwardOptions {
    gradient: Option<Tensor>,
    retain_graph: Option<bool>,
    create_graph: bool,
    inputs: Option<Vec<Tensor>>,
}

impl BackwardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gradient of the root. Required unless the root has exactly one element.
    pub fn gradient(mut self, gradient: Tensor) -> Self {
        self.gradient = Some(gradient);
        self
    }

    /// Keep saved tensors so the graph can be traversed again. Defaults to `create_graph`.
    pub fn retain_graph(mut self, retain_graph: bool) -> Self {
        self.retain_graph = Some(retain_graph);
        self
    }

    /// Record the backward computation itself so it can be differentiated.
    pub fn create_graph(mut self, create_graph: bool) -> Self {
        self.create_graph = create_graph;
        self
    }

    /// Accumulate only into these leaves.
    pub fn inputs(mut self, inputs: Vec<Tensor>) -> Self {
        self.inputs = Some(inputs);
        self
    }
}

struct ReadyNode(Arc<dyn Node>);

impl PartialEq for ReadyNode {
    fn eq(&self, other: &Self) -> bool {
        self.0.meta().sequence_nr() == other.0.meta().sequence_nr()
    }
}

impl Eq for ReadyNode {}

impl PartialOrd for ReadyNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Later-created nodes first; accumulators carry the largest number and run as soon as
// they become ready.
impl Ord for ReadyNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.meta().sequence_nr().cmp(&other.0.meta().sequence_nr())
    }
}

/// ## Backward pass
///
/// Propagates a gradient from this tensor through the recorded graph into the `grad` of
/// every reachable leaf that requires grad.
impl Tensor {
    /// # Errors
    ///
    /// Raised before any gradient is written:
    ///
    /// * `InvalidArgument` – `inputs` was supplied but is empty or holds an empty handle,
    ///   or no gradient was given for a root with more than one element
    /// * `UndefinedTensor` – the root is an empty handle
    /// * `RequiresGrad` – the root does not require grad, or an entry of `inputs` is not
    ///   a leaf requiring grad
    /// * `DimensionMismatch` / `DTypeMismatch` – the explicit gradient does not match
    ///   the root
    ///
    /// Raised while running the graph:
    ///
    /// * `GraphReleased` – the graph was already traversed without `retain_graph`
    /// * `SavedTensorModified` – a tensor saved for backward was modified in place
    pub fn try_backward(&self, options: BackwardOptions) -> Result<()> {
        let BackwardOptions {
            gradient,
            retain_graph,
            create_graph,
            inputs,
        } = options;
        let retain_graph = retain_graph.unwrap_or(create_graph);
        let mode = GradMode::from_create_graph(create_graph);

        let input_filter = match &inputs {
            Some(inputs) => Some(Self::input_accumulators(inputs)?),
            None => None,
        };

        let root_edge = self.try_gradient_edge()?;
        let Some(root) = root_edge.function.clone() else {
            return Err(Error::RequiresGrad(
                "element 0 of tensors does not require grad and does not have a grad_fn".into(),
            ));
        };
        let gradient = self.root_gradient(gradient)?;

        debug!(
            root = root.name(),
            retain_graph,
            create_graph,
            num_inputs = inputs.as_ref().map(Vec::len),
            "starting backward pass"
        );

        let mut dependencies = count_dependencies(&root);
        let mut buffers: HashMap<usize, Vec<Tensor>> = HashMap::new();
        let mut root_buffer = vec![Tensor::default(); root.meta().num_inputs().max(root_edge.input_nr + 1)];
        root_buffer[root_edge.input_nr] = gradient;
        buffers.insert(node_key(&root), root_buffer);

        let mut ready = BinaryHeap::new();
        ready.push(ReadyNode(root));

        while let Some(ReadyNode(node)) = ready.pop() {
            let key = node_key(&node);
            let num_inputs = node.meta().num_inputs();
            let mut grads = buffers
                .remove(&key)
                .unwrap_or_else(|| vec![Tensor::default(); num_inputs]);

            run_pre_hooks(node.as_ref(), &mut grads, mode)?;

            let skip_accumulator = match (&input_filter, node.accumulated_variable()) {
                (Some(filter), Some(_)) => !filter.contains(&key),
                _ => false,
            };
            let outputs = if skip_accumulator || grads.iter().all(|g| !g.is_defined()) {
                trace!(node = node.name(), "skipped node");
                Vec::new()
            } else {
                trace!(node = node.name(), sequence_nr = node.meta().sequence_nr(), "executing node");
                node.apply(grads, mode)?
            };

            if !retain_graph {
                node.release_variables();
            }

            for (i, edge) in node.meta().next_edges().iter().enumerate() {
                let Some(next) = &edge.function else {
                    continue;
                };
                let next_key = node_key(next);
                if let Some(grad) = outputs.get(i).filter(|g| g.is_defined()) {
                    accumulate_into_buffer(&mut buffers, next, edge, grad, mode)?;
                }
                let remaining = dependencies.get_mut(&next_key).ok_or_else(|| {
                    Error::InvalidState(format!("{} was not reached while counting dependencies", next.name()))
                })?;
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(ReadyNode(next.clone()));
                }
            }
        }

        debug!("backward pass finished");
        Ok(())
    }

    /// # Panics
    ///
    /// * When any precondition of [`Tensor::try_backward`] fails or a node errors
    pub fn backward(&self, options: BackwardOptions) {
        self.try_backward(options).expect("failed to run backward")
    }

    fn input_accumulators(inputs: &[Tensor]) -> Result<HashSet<usize>> {
        if inputs.is_empty() {
            return Err(Error::InvalidArgument(
                "'inputs' argument to backward cannot be empty".into(),
            ));
        }
        let mut keys = HashSet::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            if !input.is_defined() {
                return Err(Error::InvalidArgument(format!("element {i} of inputs is undefined")));
            }
            if !input.try_requires_grad()? {
                return Err(Error::RequiresGrad(format!(
                    "element {i} of inputs does not require grad"
                )));
            }
            if !input.try_is_leaf()? {
                return Err(Error::RequiresGrad(format!(
                    "element {i} of inputs is not a leaf tensor; only leaves can be backward inputs"
                )));
            }
            keys.insert(node_key(&input.try_grad_accumulator()?));
        }
        Ok(keys)
    }

    fn root_gradient(&self, gradient: Option<Tensor>) -> Result<Tensor> {
        match gradient {
            Some(gradient) => {
                let given = gradient.try_impl()?;
                if given.layout().shape() != self.layout().shape() {
                    return Err(Error::DimensionMismatch {
                        expected: self.sizes().to_vec(),
                        got: given.layout().shape().to_vec(),
                    });
                }
                if given.dtype() != self.dtype() {
                    return Err(Error::DTypeMismatch {
                        expected: self.dtype(),
                        got: given.dtype(),
                    });
                }
                Ok(gradient)
            },
            None if self.numel() == 1 => Tensor::try_ones_with_spec(self.sizes(), self.device(), self.dtype()),
            None => Err(Error::InvalidArgument(
                "grad can be implicitly created only for scalar outputs".into(),
            )),
        }
    }
}

/// Number of incoming edges of every node reachable from `root`.
fn count_dependencies(root: &Arc<dyn Node>) -> HashMap<usize, usize> {
    let mut dependencies = HashMap::new();
    let mut seen = HashSet::from([node_key(root)]);
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        for edge in node.meta().next_edges() {
            if let Some(next) = &edge.function {
                let key = node_key(next);
                *dependencies.entry(key).or_insert(0usize) += 1;
                if seen.insert(key) {
                    stack.push(next.clone());
                }
            }
        }
    }
    dependencies
}

/// Tensor hooks first, in registration order, then retained gradients, which see the
/// hooked values.
fn run_pre_hooks(node: &dyn Node, grads: &mut [Tensor], mode: GradMode) -> Result<()> {
    let pre_hooks = node.meta().pre_hooks()?;
    for hook in &pre_hooks {
        if let PreHook::Tensor { output_nr, hooks } = hook {
            let Some(slot) = grads.get_mut(*output_nr) else {
                continue;
            };
            let snapshot = hooks.lock().map_err(|_| Error::Lock)?.snapshot();
            *slot = run_hooks(&snapshot, std::mem::take(slot))?;
        }
    }
    for hook in &pre_hooks {
        if let PreHook::RetainGrad { output_nr, tensor } = hook {
            if let (Some(tensor), Some(grad)) = (tensor.upgrade(), grads.get(*output_nr)) {
                tensor.retain_incoming(grad, mode)?;
            }
        }
    }
    Ok(())
}

fn accumulate_into_buffer(
    buffers: &mut HashMap<usize, Vec<Tensor>>,
    next: &Arc<dyn Node>,
    edge: &Edge,
    grad: &Tensor,
    mode: GradMode,
) -> Result<()> {
    let num_inputs = next.meta().num_inputs().max(edge.input_nr + 1);
    let buffer = buffers
        .entry(node_key(next))
        .or_insert_with(|| vec![Tensor::default(); num_inputs]);
    let slot = &mut buffer[edge.input_nr];
    *slot = if slot.is_defined() {
        slot.try_add_with(mode, grad)?
    } else {
        grad.clone()
    };
    Ok(())
}
