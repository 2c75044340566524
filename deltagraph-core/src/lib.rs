//! Training substrate for differentiable layers arranged in a DAG.
//!
//! A [`Layer`] turns a mini-batch ([`TensorList`]) into a [`LayerResult`],
//! which can later push a gradient backward into a [`DeltaSet`]. Layers are
//! wired into a [`DagNetwork`], evaluated lazily from its head with one cache
//! per pass. [`train::evaluate`] runs a forward and a backward pass over a
//! labelled batch and returns a [`PointSample`].

pub mod context;
pub mod delta;
pub mod device;
pub mod error;
pub mod grad_check;
pub mod graph;
pub mod id;
pub mod layer;
pub mod layers;
pub mod result;
pub mod tensor;
pub mod train;

#[cfg(test)]
pub(crate) mod test_utils;

pub use context::{ExecutionContext, Precision};
pub use delta::{Delta, DeltaKey, DeltaSet};
pub use device::{DeviceBackend, DeviceError, ElementwiseOp, HostBackend};
pub use error::{DeltaGraphError, StructuralError};
pub use graph::{DagNetwork, Node, NodeHandle, NodeKind};
pub use id::{IdGenerator, LayerId, NodeId};
pub use layer::{Arity, Layer, LayerRegistry, NumericPolicy, Parameter, SerialPrecision};
pub use result::{Backward, LayerResult};
pub use tensor::{Tensor, TensorList};
pub use train::PointSample;
