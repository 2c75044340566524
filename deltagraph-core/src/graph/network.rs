use super::cache::EvaluationCache;
use super::node::{Node, NodeHandle, NodeKind};
use crate::context::ExecutionContext;
use crate::error::{DeltaGraphError, StructuralError};
use crate::id::{IdGenerator, LayerId, NodeId};
use crate::layer::{check_arity, required_input, Arity, Layer, LayerHeader, NumericPolicy, Parameter, SerialPrecision};
use crate::result::LayerResult;
use crate::tensor::TensorList;
use log::{debug, trace};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A directed acyclic graph of layers with one head.
///
/// Nodes are appended through [`DagNetwork::add`] (or a [`NodeHandle`]),
/// which validates arity and references eagerly. Evaluation is lazy from the
/// head and memoized per pass, so a node shared by several consumers runs
/// once. A network is itself a [`Layer`] and can be nested.
pub struct DagNetwork {
    pub(crate) header: LayerHeader,
    pub(crate) nodes: Vec<Node>,
    pub(crate) index: HashMap<NodeId, usize>,
    pub(crate) layers: HashMap<LayerId, Arc<dyn Layer>>,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) head: Option<NodeId>,
    pub(crate) head_pinned: bool,
    pub(crate) ids: IdGenerator,
}

impl DagNetwork {
    pub const CLASS: &'static str = "dag_network";

    /// A network with `input_count` input nodes and no layers.
    pub fn new(ids: IdGenerator, input_count: usize) -> Self {
        let header = LayerHeader::new(ids.layer_id(), false);
        let inputs: Vec<NodeId> = (0..input_count).map(|_| ids.node_id()).collect();
        Self::with_parts(header, inputs, ids)
    }

    pub(crate) fn with_parts(header: LayerHeader, inputs: Vec<NodeId>, ids: IdGenerator) -> Self {
        let nodes: Vec<Node> = inputs.iter().enumerate().map(|(i, &id)| Node::input(id, i)).collect();
        let index = nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        DagNetwork {
            header,
            nodes,
            index,
            layers: HashMap::new(),
            inputs,
            head: None,
            head_pinned: false,
            ids,
        }
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_nodes(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Handle on input node `index`, to chain layers after it.
    pub fn input(&mut self, index: usize) -> Result<NodeHandle<'_>, DeltaGraphError> {
        let id = *self.inputs.get(index).ok_or(DeltaGraphError::IndexOutOfBounds {
            index: vec![index],
            shape: vec![self.inputs.len()],
        })?;
        Ok(NodeHandle::new(self, id))
    }

    /// Handle on an existing node.
    pub fn handle(&mut self, node: NodeId) -> Result<NodeHandle<'_>, DeltaGraphError> {
        if !self.index.contains_key(&node) {
            return Err(StructuralError::UnknownNode(node).into());
        }
        Ok(NodeHandle::new(self, node))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn layer(&self, id: LayerId) -> Option<&Arc<dyn Layer>> {
        self.layers.get(&id)
    }

    /// Registered layers, ordered by id.
    pub fn layers(&self) -> Vec<&Arc<dyn Layer>> {
        let mut layers: Vec<&Arc<dyn Layer>> = self.layers.values().collect();
        layers.sort_by_key(|l| l.id());
        layers
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    /// Appends a node applying `layer` to `inputs`.
    pub fn add(&mut self, layer: Arc<dyn Layer>, inputs: &[NodeId]) -> Result<NodeHandle<'_>, DeltaGraphError> {
        self.add_with_optional(layer, inputs.iter().copied().map(Some).collect())
    }

    /// Appends a node whose `None` slots are left unconnected; only slots the
    /// layer accepts as missing may be `None`.
    ///
    /// Until [`DagNetwork::set_head`] is called, the newest node is the head.
    pub fn add_with_optional(
        &mut self,
        layer: Arc<dyn Layer>,
        inputs: Vec<Option<NodeId>>,
    ) -> Result<NodeHandle<'_>, DeltaGraphError> {
        let id = self.ids.node_id();
        self.check_inputs(id, layer.as_ref(), &inputs)?;
        self.register_layer(&layer)?;
        debug!(
            "Adding node {} ({} {}) with inputs {:?}",
            id,
            layer.class(),
            layer.id(),
            inputs
        );
        self.push_node(Node::inner(id, layer.id(), inputs));
        if !self.head_pinned {
            self.head = Some(id);
        }
        Ok(NodeHandle::new(self, id))
    }

    pub(crate) fn push_node(&mut self, node: Node) {
        self.index.insert(node.id(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn set_head(&mut self, node: NodeId) -> Result<(), DeltaGraphError> {
        if !self.index.contains_key(&node) {
            return Err(StructuralError::UnknownNode(node).into());
        }
        self.head = Some(node);
        self.head_pinned = true;
        Ok(())
    }

    /// Replaces the inputs of an inner node. Rejected, leaving the network
    /// unchanged, if the new wiring is invalid or creates a cycle.
    pub fn rewire(&mut self, node: NodeId, inputs: Vec<Option<NodeId>>) -> Result<(), DeltaGraphError> {
        let position = *self.index.get(&node).ok_or(StructuralError::UnknownNode(node))?;
        let layer_id = self.nodes[position]
            .layer_id()
            .ok_or_else(|| DeltaGraphError::Configuration(format!("cannot rewire input node {}", node)))?;
        let layer = self.layers.get(&layer_id).cloned().ok_or(StructuralError::UnknownLayer {
            node,
            layer: layer_id,
        })?;
        self.check_inputs(node, layer.as_ref(), &inputs)?;
        let previous = match self.nodes[position].kind_mut() {
            NodeKind::Inner { inputs: current, .. } => std::mem::replace(current, inputs),
            NodeKind::Input { .. } => Vec::new(),
        };
        if let Err(e) = self.topological_order() {
            if let NodeKind::Inner { inputs: current, .. } = self.nodes[position].kind_mut() {
                *current = previous;
            }
            debug!("Rewire of {} rejected: {}", node, e);
            return Err(e.into());
        }
        debug!("Rewired node {}", node);
        Ok(())
    }

    /// Places `layer` at `node` instead of its current layer. The old layer
    /// leaves the registry once no node uses it.
    pub fn replace_layer(&mut self, node: NodeId, layer: Arc<dyn Layer>) -> Result<(), DeltaGraphError> {
        let position = *self.index.get(&node).ok_or(StructuralError::UnknownNode(node))?;
        let inputs = self.nodes[position].inputs().to_vec();
        let old = self.nodes[position]
            .layer_id()
            .ok_or_else(|| DeltaGraphError::Configuration(format!("cannot replace the layer of input node {}", node)))?;
        self.check_inputs(node, layer.as_ref(), &inputs)?;
        if old == layer.id() {
            // Same identity: every node placing this id now runs the new instance.
            self.layers.insert(old, Arc::clone(&layer));
        } else {
            self.register_layer(&layer)?;
        }
        if let NodeKind::Inner { layer: current, .. } = self.nodes[position].kind_mut() {
            *current = layer.id();
        }
        if old != layer.id() && !self.nodes.iter().any(|n| n.layer_id() == Some(old)) {
            self.layers.remove(&old);
        }
        debug!("Node {} now runs {} {}", node, layer.class(), layer.id());
        Ok(())
    }

    /// Freezes every layer.
    pub fn freeze(&self) {
        self.set_frozen(true);
    }

    pub fn unfreeze(&self) {
        self.set_frozen(false);
    }

    /// Parameter buffers of every layer, ordered by layer id then slot.
    pub fn named_state(&self) -> Vec<(LayerId, usize, Parameter)> {
        self.layers()
            .into_iter()
            .flat_map(|layer| {
                let id = layer.id();
                layer.state().into_iter().enumerate().map(move |(slot, p)| (id, slot, p))
            })
            .collect()
    }

    /// Checks the whole structure: a head exists, every reference resolves,
    /// every missing input is allowed and there is no cycle.
    pub fn validate(&self) -> Result<(), DeltaGraphError> {
        let head = self.head.ok_or(StructuralError::MissingHead)?;
        if !self.index.contains_key(&head) {
            return Err(StructuralError::UnknownNode(head).into());
        }
        for node in &self.nodes {
            if let NodeKind::Inner { layer, inputs } = node.kind() {
                let layer = self.layers.get(layer).ok_or(StructuralError::UnknownLayer {
                    node: node.id(),
                    layer: *layer,
                })?;
                self.check_inputs(node.id(), layer.as_ref(), inputs)?;
            }
        }
        self.topological_order()?;
        Ok(())
    }

    /// Node ids such that every node follows its inputs.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, StructuralError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for root in &self.nodes {
            if marks.contains_key(&root.id()) {
                continue;
            }
            // Iterative DFS: (node, next input slot to visit).
            let mut stack: Vec<(NodeId, usize)> = vec![(root.id(), 0)];
            marks.insert(root.id(), Mark::Visiting);
            while let Some((current, slot)) = stack.pop() {
                let node = self
                    .node(current)
                    .ok_or(StructuralError::UnknownNode(current))?;
                match node.inputs().get(slot) {
                    Some(next) => {
                        stack.push((current, slot + 1));
                        if let Some(next) = *next {
                            if !self.index.contains_key(&next) {
                                return Err(StructuralError::DanglingNode {
                                    node: current,
                                    missing: next,
                                });
                            }
                            match marks.get(&next) {
                                Some(Mark::Visiting) => return Err(StructuralError::Cycle(next)),
                                Some(Mark::Done) => {}
                                None => {
                                    marks.insert(next, Mark::Visiting);
                                    stack.push((next, 0));
                                }
                            }
                        }
                    }
                    None => {
                        marks.insert(current, Mark::Done);
                        order.push(current);
                    }
                }
            }
        }
        Ok(order)
    }

    /// Runs one pass: seeds the input nodes with `inputs` and evaluates the
    /// head. The cache lives for this call only.
    pub fn evaluate(&self, ctx: &ExecutionContext, inputs: &[LayerResult]) -> Result<LayerResult, DeltaGraphError> {
        if inputs.len() != self.inputs.len() {
            return Err(DeltaGraphError::Arity {
                layer: self.id(),
                class: Self::CLASS.to_string(),
                expected: format!("exactly {}", self.inputs.len()),
                actual: inputs.len(),
            });
        }
        let head = self.head.ok_or(StructuralError::MissingHead)?;
        let mut cache = EvaluationCache::new();
        for (node, value) in self.inputs.iter().zip(inputs.iter()) {
            cache.seed(*node, value.clone());
        }
        let result = self.get(ctx, &mut cache, head)?;
        trace!("Pass over {} finished with {} cached node(s)", self.id(), cache.cached());
        Ok(result)
    }

    /// Evaluates on plain batches. Inputs carry no gradient path, so only
    /// parameter deltas are produced by a backward pass.
    pub fn evaluate_lists(&self, ctx: &ExecutionContext, inputs: &[TensorList]) -> Result<LayerResult, DeltaGraphError> {
        let inputs: Vec<LayerResult> = inputs.iter().cloned().map(LayerResult::constant).collect();
        self.evaluate(ctx, &inputs)
    }

    /// Result of `node` for the pass owning `cache`, computing it and its
    /// inputs on first request.
    pub fn get(&self, ctx: &ExecutionContext, cache: &mut EvaluationCache, node: NodeId) -> Result<LayerResult, DeltaGraphError> {
        if let Some(result) = cache.get(node) {
            return Ok(result.clone());
        }
        let current = self.node(node).ok_or(StructuralError::UnknownNode(node))?;
        let (layer_id, inputs) = match current.kind() {
            NodeKind::Inner { layer, inputs } => (*layer, inputs),
            // Input nodes are seeded at pass start.
            NodeKind::Input { index } => {
                return Err(DeltaGraphError::MissingValue {
                    layer: self.id(),
                    class: Self::CLASS.to_string(),
                    slot: *index,
                })
            }
        };
        cache.begin(node)?;
        let computed = self.compute(ctx, cache, node, layer_id, inputs);
        match computed {
            Ok(result) => {
                cache.finish(node, result.clone());
                Ok(result)
            }
            Err(e) => {
                cache.abandon(node);
                Err(e)
            }
        }
    }

    fn compute(
        &self,
        ctx: &ExecutionContext,
        cache: &mut EvaluationCache,
        node: NodeId,
        layer_id: LayerId,
        inputs: &[Option<NodeId>],
    ) -> Result<LayerResult, DeltaGraphError> {
        let layer = self
            .layers
            .get(&layer_id)
            .ok_or(StructuralError::UnknownLayer { node, layer: layer_id })?;
        let mut values = Vec::with_capacity(inputs.len());
        for input in inputs {
            values.push(match input {
                Some(id) => Some(self.get(ctx, cache, *id)?),
                None => None,
            });
        }
        trace!("Evaluating node {} ({} {})", node, layer.class(), layer.id());
        layer.eval(ctx, &values)
    }

    fn check_inputs(&self, node: NodeId, layer: &dyn Layer, inputs: &[Option<NodeId>]) -> Result<(), DeltaGraphError> {
        let arity = layer.arity();
        if !arity.accepts(inputs.len()) {
            return Err(DeltaGraphError::Arity {
                layer: layer.id(),
                class: layer.class().to_string(),
                expected: arity.to_string(),
                actual: inputs.len(),
            });
        }
        for (slot, input) in inputs.iter().enumerate() {
            match input {
                Some(id) if !self.index.contains_key(id) => {
                    return Err(StructuralError::DanglingNode { node, missing: *id }.into());
                }
                None if !layer.accepts_missing(slot) => {
                    return Err(StructuralError::MissingInput {
                        node,
                        slot,
                        class: layer.class().to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        }
        if !inputs.is_empty() && inputs.iter().all(Option::is_none) {
            return Err(StructuralError::MissingInput {
                node,
                slot: 0,
                class: layer.class().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Registers `layer` unless its id, or the id of a layer nested in it,
    /// already names a different instance anywhere in this network.
    pub(crate) fn register_layer(&mut self, layer: &Arc<dyn Layer>) -> Result<(), DeltaGraphError> {
        if let Some(existing) = self.layers.get(&layer.id()) {
            return if Arc::ptr_eq(existing, layer) {
                Ok(())
            } else {
                Err(StructuralError::DuplicateLayer(layer.id()).into())
            };
        }
        let known = self.all_layers();
        let incoming = std::iter::once(Arc::clone(layer)).chain(layer.nested_layers());
        for candidate in incoming {
            if known.iter().any(|k| k.id() == candidate.id() && !Arc::ptr_eq(k, &candidate)) {
                return Err(StructuralError::DuplicateLayer(candidate.id()).into());
            }
        }
        self.layers.insert(layer.id(), Arc::clone(layer));
        Ok(())
    }

    /// Top-level layers followed by everything nested inside them.
    fn all_layers(&self) -> Vec<Arc<dyn Layer>> {
        self.layers
            .values()
            .flat_map(|l| std::iter::once(Arc::clone(l)).chain(l.nested_layers()))
            .collect()
    }

    /// Largest id used anywhere in the network, nested networks included,
    /// for resuming id generation.
    pub(crate) fn max_id(&self) -> u64 {
        let nodes = self.nodes.iter().map(|n| n.id().0);
        let layers = self.all_layers().into_iter().map(|l| l.id().0);
        nodes.chain(layers).chain(std::iter::once(self.id().0)).max().unwrap_or(0)
    }
}

impl fmt::Debug for DagNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagNetwork")
            .field("id", &self.header.id())
            .field("inputs", &self.inputs)
            .field("nodes", &self.nodes.len())
            .field("layers", &self.layers.len())
            .field("head", &self.head)
            .finish()
    }
}

impl Layer for DagNetwork {
    fn id(&self) -> LayerId {
        self.header.id()
    }

    fn class(&self) -> &'static str {
        Self::CLASS
    }

    fn arity(&self) -> Arity {
        Arity::Exact(self.inputs.len())
    }

    fn eval(&self, ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError> {
        check_arity(self, inputs)?;
        let values = (0..inputs.len())
            .map(|slot| required_input(self, inputs, slot).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        self.evaluate(ctx, &values)
    }

    fn state(&self) -> Vec<Parameter> {
        self.named_state().into_iter().map(|(_, _, p)| p).collect()
    }

    fn nested_layers(&self) -> Vec<Arc<dyn Layer>> {
        self.all_layers()
    }

    fn is_frozen(&self) -> bool {
        self.header.is_frozen()
    }

    fn set_frozen(&self, frozen: bool) {
        debug!("Network {}: setting frozen = {} on {} layer(s)", self.id(), frozen, self.layers.len());
        self.header.set_frozen(frozen);
        for layer in self.layers.values() {
            layer.set_frozen(frozen);
        }
    }

    fn numeric_policy(&self) -> NumericPolicy {
        if self
            .layers
            .values()
            .any(|l| l.numeric_policy() == NumericPolicy::Reject)
        {
            NumericPolicy::Reject
        } else {
            NumericPolicy::Sanitize
        }
    }

    fn to_json(&self, precision: SerialPrecision) -> Result<serde_json::Value, DeltaGraphError> {
        self.encode(precision)
    }
}

#[cfg(test)]
#[path = "network_test.rs"]
mod tests;
