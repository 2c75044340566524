use crate::device::DeviceError;
use crate::id::{LayerId, NodeId};
use thiserror::Error;

/// Custom error type for the deltagraph framework.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeltaGraphError {
    /// Wrong number of inputs presented to a layer. Never retried.
    #[error("Layer {class} ({layer}) expects {expected} input(s), got {actual}")]
    Arity {
        layer: LayerId,
        class: String,
        expected: String,
        actual: usize,
    },

    /// A required input slot received no value at evaluation time.
    #[error("Layer {class} ({layer}) received no value for required input slot {slot}")]
    MissingValue {
        layer: LayerId,
        class: String,
        slot: usize,
    },

    /// Malformed graph, raised while the graph is being built or loaded.
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// A non-finite value reached a layer whose policy rejects it.
    #[error("Non-finite value {value} in layer {class} ({layer}) at batch item {item}, element {index}")]
    NumericAnomaly {
        layer: LayerId,
        class: String,
        item: usize,
        index: usize,
        value: f64,
    },

    /// Device or kernel failure, with the tensor shapes of the failed operation.
    #[error("Device failure during '{operation}' (shapes {shapes:?}): {source}")]
    Component {
        operation: String,
        shapes: Vec<Vec<usize>>,
        #[source]
        source: DeviceError,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreation { data_len: usize, shape: Vec<usize> },

    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Batch length mismatch during {operation}: expected {expected}, got {actual}")]
    BatchMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Cannot build a tensor list from an empty batch")]
    EmptyTensorList,

    #[error("No layer class registered under '{0}'")]
    UnknownLayerClass(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Ways a graph can be malformed. All of them are detected eagerly,
/// when nodes are added, rewired or deserialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Cycle detected through node {0}")]
    Cycle(NodeId),

    #[error("Node {node} references unknown node {missing}")]
    DanglingNode { node: NodeId, missing: NodeId },

    #[error("Network has no head node")]
    MissingHead,

    #[error("Node {node} leaves required input slot {slot} of layer {class} empty")]
    MissingInput {
        node: NodeId,
        slot: usize,
        class: String,
    },

    #[error("Node {node} references unregistered layer {layer}")]
    UnknownLayer { node: NodeId, layer: LayerId },

    #[error("Layer {0} is already registered with a different instance")]
    DuplicateLayer(LayerId),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

impl From<serde_json::Error> for DeltaGraphError {
    fn from(err: serde_json::Error) -> Self {
        DeltaGraphError::Serialization(err.to_string())
    }
}
