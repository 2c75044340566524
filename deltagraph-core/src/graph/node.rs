use super::DagNetwork;
use crate::error::DeltaGraphError;
use crate::id::{LayerId, NodeId};
use crate::layer::Layer;
use std::fmt;
use std::sync::Arc;

/// What a node computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Reads network input `index`, seeded at the start of each pass.
    Input { index: usize },
    /// Applies `layer` to the results of `inputs`, in slot order. `None`
    /// marks a deliberately unconnected optional slot.
    Inner {
        layer: LayerId,
        inputs: Vec<Option<NodeId>>,
    },
}

/// One placement of a layer (or an input slot) in a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn input(id: NodeId, index: usize) -> Self {
        Node {
            id,
            kind: NodeKind::Input { index },
        }
    }

    pub(crate) fn inner(id: NodeId, layer: LayerId, inputs: Vec<Option<NodeId>>) -> Self {
        Node {
            id,
            kind: NodeKind::Inner { layer, inputs },
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn layer_id(&self) -> Option<LayerId> {
        match &self.kind {
            NodeKind::Input { .. } => None,
            NodeKind::Inner { layer, .. } => Some(*layer),
        }
    }

    /// Input node ids in slot order; empty for input nodes.
    pub fn inputs(&self) -> &[Option<NodeId>] {
        match &self.kind {
            NodeKind::Input { .. } => &[],
            NodeKind::Inner { inputs, .. } => inputs,
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }
}

/// A node borrowed together with its network, used to grow the graph
/// downstream of it.
///
/// The handle is the only back-reference from a node to its network; it
/// does not outlive the borrow.
pub struct NodeHandle<'a> {
    network: &'a mut DagNetwork,
    id: NodeId,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(network: &'a mut DagNetwork, id: NodeId) -> Self {
        NodeHandle { network, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> Option<&Node> {
        self.network.node(self.id)
    }

    /// Appends `layer` fed by this node alone and returns its handle.
    pub fn then(self, layer: Arc<dyn Layer>) -> Result<NodeHandle<'a>, DeltaGraphError> {
        let id = self.id;
        self.network.add(layer, &[id])
    }

    /// Appends `layer` fed by this node in slot 0 followed by `others`.
    pub fn join(self, layer: Arc<dyn Layer>, others: &[NodeId]) -> Result<NodeHandle<'a>, DeltaGraphError> {
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(self.id);
        inputs.extend_from_slice(others);
        self.network.add(layer, &inputs)
    }

    /// Makes this node the network's head.
    pub fn set_as_head(self) -> Result<NodeId, DeltaGraphError> {
        self.network.set_head(self.id)?;
        Ok(self.id)
    }

    pub fn network(&mut self) -> &mut DagNetwork {
        self.network
    }
}

impl fmt::Debug for NodeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle").field("id", &self.id).finish()
    }
}
