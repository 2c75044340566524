//! The contract every differentiable layer satisfies.

use crate::context::ExecutionContext;
use crate::error::DeltaGraphError;
use crate::id::LayerId;
use crate::result::LayerResult;
use crate::tensor::{Tensor, TensorList};
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod parameter;
pub mod registry;

pub use parameter::Parameter;
pub use registry::LayerRegistry;

/// Number of inputs a layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// What a layer does with NaN or infinite inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Fails the pass with `DeltaGraphError::NumericAnomaly`.
    Reject,
    /// Replaces non-finite values with a documented substitute.
    Sanitize,
}

/// Precision of floating point values written by `to_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialPrecision {
    /// Bit-exact f64.
    #[default]
    Double,
    /// Rounded through f32; smaller files, lossy.
    Float,
}

impl SerialPrecision {
    pub fn apply(self, tensor: &Tensor) -> Tensor {
        match self {
            SerialPrecision::Double => tensor.clone(),
            SerialPrecision::Float => tensor.map(|v| v as f32 as f64),
        }
    }
}

/// A stable-identity, possibly parametric transformation of a mini-batch.
///
/// Identity is the `LayerId`. Implementations must be shareable across
/// threads: many passes may call `eval` on the same layer concurrently, so all
/// per-pass state lives in the returned [`LayerResult`].
pub trait Layer: Debug + Send + Sync {
    fn id(&self) -> LayerId;

    /// Serialization discriminator, e.g. `"softmax"`.
    fn class(&self) -> &'static str;

    fn arity(&self) -> Arity;

    /// Whether input `slot` may be left unconnected (`None`).
    fn accepts_missing(&self, _slot: usize) -> bool {
        false
    }

    /// Forward pass. `inputs` must satisfy [`Layer::arity`]. The layer keeps
    /// inputs only inside the returned result's backward context.
    fn eval(&self, ctx: &ExecutionContext, inputs: &[Option<LayerResult>]) -> Result<LayerResult, DeltaGraphError>;

    /// Live parameter buffers, in slot order. Writes through them change the
    /// layer.
    fn state(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Layers held inside this one, at any depth. Empty for leaf layers.
    fn nested_layers(&self) -> Vec<Arc<dyn Layer>> {
        Vec::new()
    }

    fn is_frozen(&self) -> bool;

    /// A frozen layer produces no parameter deltas but still propagates
    /// gradient to its inputs.
    fn set_frozen(&self, frozen: bool);

    fn numeric_policy(&self) -> NumericPolicy;

    fn to_json(&self, precision: SerialPrecision) -> Result<Value, DeltaGraphError>;
}

/// Id and frozen flag, shared by every built-in layer.
#[derive(Debug)]
pub struct LayerHeader {
    id: LayerId,
    frozen: AtomicBool,
}

impl LayerHeader {
    pub fn new(id: LayerId, frozen: bool) -> Self {
        LayerHeader {
            id,
            frozen: AtomicBool::new(frozen),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
    }
}

/// Serializes `record` and tags it with `class`.
pub fn encode_record<R: Serialize>(class: &str, record: &R) -> Result<Value, DeltaGraphError> {
    let mut value = serde_json::to_value(record)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("class".to_string(), Value::String(class.to_string()));
            Ok(value)
        }
        None => Err(DeltaGraphError::Serialization(format!(
            "record of class '{}' is not a JSON object",
            class
        ))),
    }
}

/// Fails with `DeltaGraphError::Arity` unless `inputs.len()` fits.
pub fn check_arity(layer: &dyn Layer, inputs: &[Option<LayerResult>]) -> Result<(), DeltaGraphError> {
    let arity = layer.arity();
    if !arity.accepts(inputs.len()) {
        return Err(DeltaGraphError::Arity {
            layer: layer.id(),
            class: layer.class().to_string(),
            expected: arity.to_string(),
            actual: inputs.len(),
        });
    }
    Ok(())
}

/// The value in `slot`, or `MissingValue` if it is absent.
pub fn required_input<'a>(
    layer: &dyn Layer,
    inputs: &'a [Option<LayerResult>],
    slot: usize,
) -> Result<&'a LayerResult, DeltaGraphError> {
    inputs
        .get(slot)
        .and_then(Option::as_ref)
        .ok_or_else(|| DeltaGraphError::MissingValue {
            layer: layer.id(),
            class: layer.class().to_string(),
            slot,
        })
}

/// All present inputs must carry the same number of batch items.
pub fn common_batch_len(layer: &dyn Layer, inputs: &[Option<LayerResult>]) -> Result<usize, DeltaGraphError> {
    let mut present = inputs.iter().flatten();
    let first = present
        .next()
        .ok_or_else(|| DeltaGraphError::MissingValue {
            layer: layer.id(),
            class: layer.class().to_string(),
            slot: 0,
        })?
        .data()
        .len();
    for input in present {
        if input.data().len() != first {
            return Err(DeltaGraphError::BatchMismatch {
                expected: first,
                actual: input.data().len(),
                operation: format!("{} ({})", layer.class(), layer.id()),
            });
        }
    }
    Ok(first)
}

/// Enforces `NumericPolicy::Reject` on one input list.
pub fn reject_non_finite(layer: &dyn Layer, list: &TensorList) -> Result<(), DeltaGraphError> {
    for (item, tensor) in list.iter().enumerate() {
        if let Some((index, value)) = tensor.first_non_finite() {
            return Err(DeltaGraphError::NumericAnomaly {
                layer: layer.id(),
                class: layer.class().to_string(),
                item,
                index,
                value,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "layer_test.rs"]
mod tests;
