//! JSON form of a [`DagNetwork`].
//!
//! Nodes are written in topological order and layers by ascending id, so the
//! same network always produces the same document. Every contained layer is
//! embedded as its own tagged record and decoded back through a
//! [`LayerRegistry`].

use super::network::DagNetwork;
use super::node::{Node, NodeKind};
use crate::error::DeltaGraphError;
use crate::id::{IdGenerator, LayerId, NodeId};
use crate::layer::{encode_record, Layer, LayerHeader, LayerRegistry, SerialPrecision};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
struct NetworkRecord {
    id: LayerId,
    #[serde(default)]
    frozen: bool,
    inputs: Vec<NodeId>,
    nodes: Vec<NodeRecord>,
    layers: Vec<Value>,
    head: Option<NodeId>,
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    id: NodeId,
    layer: LayerId,
    inputs: Vec<Option<NodeId>>,
}

impl DagNetwork {
    pub(crate) fn encode(&self, precision: SerialPrecision) -> Result<Value, DeltaGraphError> {
        let order = self.topological_order()?;
        let nodes = order
            .into_iter()
            .filter_map(|id| self.node(id))
            .filter_map(|node| match node.kind() {
                NodeKind::Inner { layer, inputs } => Some(NodeRecord {
                    id: node.id(),
                    layer: *layer,
                    inputs: inputs.clone(),
                }),
                NodeKind::Input { .. } => None,
            })
            .collect();
        let layers = self
            .layers()
            .into_iter()
            .map(|layer| layer.to_json(precision))
            .collect::<Result<Vec<_>, _>>()?;
        encode_record(
            Self::CLASS,
            &NetworkRecord {
                id: self.id(),
                frozen: self.is_frozen(),
                inputs: self.inputs.clone(),
                nodes,
                layers,
                head: self.head,
            },
        )
    }

    /// Pretty-printed JSON document of the whole network.
    pub fn to_json_string(&self, precision: SerialPrecision) -> Result<String, DeltaGraphError> {
        let value = self.encode(precision)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Rebuilds a network written by [`DagNetwork::to_json_string`]. The
    /// result is validated as a whole; new ids continue after the largest
    /// id found in the document.
    pub fn from_json(value: &Value, registry: &LayerRegistry) -> Result<DagNetwork, DeltaGraphError> {
        let record: NetworkRecord = serde_json::from_value(value.clone())?;
        for (i, input) in record.inputs.iter().enumerate() {
            if record.inputs[..i].contains(input) {
                return Err(DeltaGraphError::Serialization(format!("input node {} appears twice", input)));
            }
        }
        let mut network = DagNetwork::with_parts(
            LayerHeader::new(record.id, record.frozen),
            record.inputs,
            IdGenerator::sequential(),
        );
        for layer in &record.layers {
            network.register_layer(&registry.decode(layer)?)?;
        }
        for node in record.nodes {
            if network.index.contains_key(&node.id) {
                return Err(DeltaGraphError::Serialization(format!("node {} appears twice", node.id)));
            }
            network.push_node(Node::inner(node.id, node.layer, node.inputs));
        }
        network.head = record.head;
        network.head_pinned = record.head.is_some();
        network.validate()?;
        network.ids = IdGenerator::starting_at(network.max_id() + 1);
        debug!(
            "Loaded network {} with {} node(s) and {} layer(s)",
            network.id(),
            network.nodes.len(),
            network.layers.len()
        );
        Ok(network)
    }

    pub fn from_json_str(json: &str, registry: &LayerRegistry) -> Result<DagNetwork, DeltaGraphError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json(&value, registry)
    }

    /// Registry constructor for networks nested as layers.
    pub fn from_json_layer(value: &Value, registry: &LayerRegistry) -> Result<Arc<dyn Layer>, DeltaGraphError> {
        Ok(Arc::new(Self::from_json(value, registry)?))
    }
}

#[cfg(test)]
#[path = "serial_test.rs"]
mod tests;
