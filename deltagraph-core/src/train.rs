//! One training evaluation: forward a labelled batch, backpropagate the loss.

use crate::context::ExecutionContext;
use crate::delta::DeltaSet;
use crate::error::DeltaGraphError;
use crate::graph::DagNetwork;
use crate::layer::Layer;
use crate::result::LayerResult;
use crate::tensor::{Tensor, TensorList};
use log::{debug, trace};

/// Loss and summed parameter deltas of one or more evaluated batches.
///
/// `merge` is associative and commutative up to float rounding, so samples of
/// disjoint partitions can be reduced in any order.
#[derive(Debug, Clone, Default)]
pub struct PointSample {
    loss_sum: f64,
    count: usize,
    delta: DeltaSet,
}

impl PointSample {
    /// The merge identity.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(loss_sum: f64, count: usize, delta: DeltaSet) -> Self {
        PointSample { loss_sum, count, delta }
    }

    pub fn loss_sum(&self) -> f64 {
        self.loss_sum
    }

    /// Number of batch items evaluated.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of the per-item deltas.
    pub fn delta(&self) -> &DeltaSet {
        &self.delta
    }

    pub fn into_delta(self) -> DeltaSet {
        self.delta
    }

    /// `None` for an empty sample.
    pub fn mean_loss(&self) -> Option<f64> {
        (self.count > 0).then(|| self.loss_sum / self.count as f64)
    }

    /// The delta divided by the item count, i.e. the mean gradient.
    pub fn normalized(&self) -> DeltaSet {
        let mut delta = self.delta.clone();
        if self.count > 0 {
            delta.scale(1.0 / self.count as f64);
        }
        delta
    }

    pub fn merge(&mut self, other: &PointSample) -> Result<(), DeltaGraphError> {
        self.delta.merge(&other.delta)?;
        self.loss_sum += other.loss_sum;
        self.count += other.count;
        Ok(())
    }
}

/// Evaluates `network` on `batch` and returns its loss and deltas.
///
/// The network takes two inputs, features then labels, and its head yields the
/// per-item loss. Every loss element is seeded with gradient 1, so the delta
/// is the sum over items. Errors leave nothing behind: no partial sample is
/// produced and no parameter is written.
pub fn evaluate(
    network: &DagNetwork,
    ctx: &ExecutionContext,
    batch: &[(Tensor, Tensor)],
) -> Result<PointSample, DeltaGraphError> {
    if batch.is_empty() {
        return Ok(PointSample::empty());
    }
    let features = TensorList::new(batch.iter().map(|(x, _)| x.clone()).collect())?;
    let labels = TensorList::new(batch.iter().map(|(_, y)| y.clone()).collect())?;
    let inputs = [LayerResult::constant(features), LayerResult::constant(labels)];
    let loss = network.evaluate(ctx, &inputs)?;
    for (item, tensor) in loss.data().iter().enumerate() {
        if let Some((index, value)) = tensor.first_non_finite() {
            return Err(DeltaGraphError::NumericAnomaly {
                layer: network.id(),
                class: DagNetwork::CLASS.to_string(),
                item,
                index,
                value,
            });
        }
    }
    let loss_sum: f64 = loss.data().iter().map(Tensor::sum).sum();

    let mut delta = DeltaSet::new();
    let seed = loss.data().map_items(|t| Tensor::full(t.shape(), 1.0));
    loss.accumulate(ctx, &mut delta, &seed)?;
    trace!("Backward pass produced {} delta(s)", delta.len());
    debug!("Evaluated {} item(s), loss sum {:.6}", batch.len(), loss_sum);
    Ok(PointSample::new(loss_sum, batch.len(), delta))
}

#[cfg(test)]
#[path = "train_test.rs"]
mod tests;
