//! Forward values paired with their backward continuation.

use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::id::LayerId;
use crate::layer::Parameter;
use crate::tensor::TensorList;
use std::fmt::Debug;
use std::sync::Arc;

/// Backward context of one forward evaluation.
///
/// Holds exactly the forward intermediates the vector-Jacobian product needs.
/// `accumulate` must (a) add parameter gradients to `delta` when the layer is
/// unfrozen, and (b) forward the input gradient to every alive input by
/// calling that input's [`LayerResult::accumulate`].
pub trait Backward: Debug + Send + Sync {
    /// True iff some input is alive, or the layer is unfrozen and has
    /// parameters.
    fn is_alive(&self) -> bool;

    fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError>;
}

#[derive(Debug)]
struct ResultInner {
    data: TensorList,
    backward: Option<Box<dyn Backward>>,
}

/// The output of one layer evaluation.
///
/// Cheap to clone; clones share the data and the backward context. Results are
/// transient: they live for one pass and are dropped with its cache.
#[derive(Debug, Clone)]
pub struct LayerResult {
    inner: Arc<ResultInner>,
}

impl LayerResult {
    /// A value with no gradient path.
    pub fn constant(data: TensorList) -> Self {
        LayerResult {
            inner: Arc::new(ResultInner { data, backward: None }),
        }
    }

    pub fn new<B: Backward + 'static>(data: TensorList, backward: B) -> Self {
        LayerResult {
            inner: Arc::new(ResultInner {
                data,
                backward: Some(Box::new(backward)),
            }),
        }
    }

    /// A leaf value whose gradient is collected in the DeltaSet under
    /// `(id, item)` for each batch item. Used to read input gradients.
    pub fn tracked(data: TensorList, id: LayerId) -> Self {
        let targets = data.iter().cloned().map(Parameter::new).collect();
        Self::new(data, TrackedInput { id, targets })
    }

    pub fn data(&self) -> &TensorList {
        &self.inner.data
    }

    pub fn is_alive(&self) -> bool {
        self.inner
            .backward
            .as_ref()
            .map(|b| b.is_alive())
            .unwrap_or(false)
    }

    /// Pushes `gradient` (shaped like [`LayerResult::data`]) backward.
    ///
    /// Not idempotent: two calls with the same gradient count it twice.
    pub fn accumulate(&self, ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        self.inner.data.check_compatible(gradient, "LayerResult::accumulate")?;
        match &self.inner.backward {
            Some(backward) if backward.is_alive() => backward.accumulate(ctx, delta, gradient),
            _ => Ok(()),
        }
    }

    pub fn ptr_eq(&self, other: &LayerResult) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug)]
struct TrackedInput {
    id: LayerId,
    targets: Vec<Parameter>,
}

impl Backward for TrackedInput {
    fn is_alive(&self) -> bool {
        true
    }

    fn accumulate(&self, _ctx: &ExecutionContext, delta: &mut DeltaSet, gradient: &TensorList) -> Result<(), DeltaGraphError> {
        for (slot, (target, g)) in self.targets.iter().zip(gradient.iter()).enumerate() {
            delta.accumulate(self.id, slot, target, g)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "result_test.rs"]
mod tests;
