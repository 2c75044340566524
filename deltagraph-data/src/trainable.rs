//! Batch measurement for optimizers.
//!
//! A [`Trainable`] turns a labelled batch into a [`PointSample`]: the summed
//! loss and the summed parameter deltas. It never writes parameters; applying
//! the delta is the optimizer's job.

use crate::dataloader::DataLoader;
use crate::datasets::Dataset;
use crate::samplers::Sampler;
use deltagraph_core::{train, DagNetwork, DeltaGraphError, ExecutionContext, PointSample, Tensor};
use log::{debug, trace};
use rayon::prelude::*;
use std::sync::Arc;

pub trait Trainable: Send + Sync {
    fn measure(&self, ctx: &ExecutionContext, batch: &[(Tensor, Tensor)]) -> Result<PointSample, DeltaGraphError>;

    /// Measures every batch a loader yields and merges the results.
    fn measure_epoch<D, S>(&self, ctx: &ExecutionContext, loader: &mut DataLoader<D, S>) -> Result<PointSample, DeltaGraphError>
    where
        D: Dataset<Item = (Tensor, Tensor)>,
        S: Sampler,
        Self: Sized,
    {
        let mut total = PointSample::empty();
        for batch in loader.by_ref() {
            total.merge(&self.measure(ctx, &batch?)?)?;
        }
        Ok(total)
    }
}

impl Trainable for DagNetwork {
    fn measure(&self, ctx: &ExecutionContext, batch: &[(Tensor, Tensor)]) -> Result<PointSample, DeltaGraphError> {
        train::evaluate(self, ctx, batch)
    }
}

/// Splits each batch into contiguous partitions and evaluates them on the
/// rayon pool.
///
/// The network is shared, not cloned: every partition runs its own pass with
/// its own evaluation cache. Partition samples are reduced with
/// `PointSample::merge`, so the result matches a single whole-batch
/// evaluation up to float rounding. Any partition failing fails the batch.
#[derive(Debug, Clone)]
pub struct PartitionedTrainable {
    network: Arc<DagNetwork>,
    partitions: usize,
}

impl PartitionedTrainable {
    /// # Errors
    ///
    /// `Configuration` if `partitions` is zero.
    pub fn new(network: Arc<DagNetwork>, partitions: usize) -> Result<Self, DeltaGraphError> {
        if partitions == 0 {
            return Err(DeltaGraphError::Configuration(
                "PartitionedTrainable needs at least one partition".to_string(),
            ));
        }
        Ok(PartitionedTrainable { network, partitions })
    }

    /// One partition per rayon worker.
    pub fn per_thread(network: Arc<DagNetwork>) -> Self {
        PartitionedTrainable {
            network,
            partitions: rayon::current_num_threads().max(1),
        }
    }

    pub fn network(&self) -> &Arc<DagNetwork> {
        &self.network
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }
}

impl Trainable for PartitionedTrainable {
    fn measure(&self, ctx: &ExecutionContext, batch: &[(Tensor, Tensor)]) -> Result<PointSample, DeltaGraphError> {
        if batch.is_empty() {
            return Ok(PointSample::empty());
        }
        let chunk = batch.len().div_ceil(self.partitions);
        trace!(
            "Measuring {} item(s) in {} partition(s) of up to {}",
            batch.len(),
            batch.len().div_ceil(chunk),
            chunk
        );
        let sample = batch
            .par_chunks(chunk)
            .map(|part| train::evaluate(&self.network, ctx, part))
            .try_reduce(PointSample::empty, |mut acc, part| {
                acc.merge(&part)?;
                Ok(acc)
            })?;
        debug!(
            "Partitioned measurement: {} item(s), mean loss {:?}",
            sample.count(),
            sample.mean_loss()
        );
        Ok(sample)
    }
}

#[cfg(test)]
#[path = "trainable_test.rs"]
mod tests;
