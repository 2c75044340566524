//! Gradient accumulation keyed by parameter buffer.

use crate::error::DeltaGraphError;
use crate::id::LayerId;
use crate::layer::Parameter;
use crate::tensor::Tensor;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

/// Identifies one parameter buffer: the owning layer and the buffer's index in
/// [`Layer::state`](crate::layer::Layer::state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeltaKey {
    pub layer: LayerId,
    pub slot: usize,
}

impl fmt::Display for DeltaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.layer, self.slot)
    }
}

/// Accumulated gradient for one buffer, plus a handle on the buffer it
/// applies to.
#[derive(Debug, Clone)]
pub struct Delta {
    target: Parameter,
    gradient: Tensor,
}

impl Delta {
    pub fn target(&self) -> &Parameter {
        &self.target
    }

    pub fn gradient(&self) -> &Tensor {
        &self.gradient
    }
}

/// Map of accumulating gradient buffers.
///
/// Repeated contributions to one key are summed. Iteration follows key order
/// so reductions are deterministic. A `DeltaSet` never writes the live
/// buffers it refers to.
#[derive(Debug, Clone, Default)]
pub struct DeltaSet {
    entries: BTreeMap<DeltaKey, Delta>,
}

impl DeltaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `gradient` to the accumulator of `(layer, slot)`, creating a
    /// zeroed one shaped like `target` on first use.
    pub fn accumulate(&mut self, layer: LayerId, slot: usize, target: &Parameter, gradient: &Tensor) -> Result<(), DeltaGraphError> {
        let key = DeltaKey { layer, slot };
        match self.entries.entry(key) {
            btree_map::Entry::Occupied(mut entry) => entry.get_mut().gradient.add_assign(gradient),
            btree_map::Entry::Vacant(entry) => {
                let shape = target.shape();
                if shape.as_slice() != gradient.shape() {
                    return Err(DeltaGraphError::ShapeMismatch {
                        expected: shape,
                        actual: gradient.shape().to_vec(),
                        operation: format!("DeltaSet::accumulate {}", key),
                    });
                }
                entry.insert(Delta {
                    target: target.clone(),
                    gradient: gradient.clone(),
                });
                Ok(())
            }
        }
    }

    /// Key-wise union-sum of `other` into `self`.
    pub fn merge(&mut self, other: &DeltaSet) -> Result<(), DeltaGraphError> {
        for (key, delta) in &other.entries {
            self.accumulate(key.layer, key.slot, &delta.target, &delta.gradient)?;
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        for delta in self.entries.values_mut() {
            delta.gradient.scale_in_place(factor);
        }
    }

    pub fn get(&self, layer: LayerId, slot: usize) -> Option<&Tensor> {
        self.entries.get(&DeltaKey { layer, slot }).map(|d| &d.gradient)
    }

    pub fn target(&self, layer: LayerId, slot: usize) -> Option<&Parameter> {
        self.entries.get(&DeltaKey { layer, slot }).map(|d| &d.target)
    }

    pub fn contains_layer(&self, layer: LayerId) -> bool {
        self.entries.keys().any(|k| k.layer == layer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeltaKey, &Delta)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DeltaKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Euclidean norm over all accumulated gradients.
    pub fn l2_norm(&self) -> f64 {
        self.entries
            .values()
            .flat_map(|d| d.gradient.data().iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
#[path = "delta_test.rs"]
mod tests;
