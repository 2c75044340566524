//! Batching over a [`Dataset`] in the order chosen by a [`Sampler`].
//!
//! ```rust
//! use deltagraph_data::dataloader::DataLoader;
//! use deltagraph_data::datasets::VecDataset;
//! use deltagraph_data::samplers::SequentialSampler;
//!
//! let dataset = VecDataset::new(vec![1, 2, 3, 4, 5, 6]);
//! let loader = DataLoader::new(dataset, 4, SequentialSampler::new(), false, None);
//! let batches: Vec<Vec<i32>> = loader.map(|b| b.unwrap()).collect();
//! assert_eq!(batches, vec![vec![1, 2, 3, 4], vec![5, 6]]);
//! ```

use crate::datasets::Dataset;
use crate::samplers::Sampler;
use deltagraph_core::DeltaGraphError;
use log::trace;

/// Post-processes the items of one batch before it is handed out.
pub type CollateFn<D> =
    Box<dyn Fn(Vec<<D as Dataset>::Item>) -> Result<Vec<<D as Dataset>::Item>, DeltaGraphError> + Send + Sync>;

/// Iterator over the batches of one epoch.
///
/// The first failing `Dataset::get` ends the batch with an error; iteration
/// may continue afterwards with the next indices. `reset` starts a new epoch
/// with a fresh index stream from the sampler.
pub struct DataLoader<D: Dataset, S: Sampler> {
    pub dataset: D,
    pub batch_size: usize,
    pub sampler: S,
    /// Skip a trailing batch shorter than `batch_size`.
    pub drop_last: bool,
    pub collate_fn: Option<CollateFn<D>>,
    indices_iter: Box<dyn Iterator<Item = usize> + Send + Sync>,
}

impl<D: Dataset, S: Sampler> DataLoader<D, S> {
    pub fn new(dataset: D, batch_size: usize, sampler: S, drop_last: bool, collate_fn: Option<CollateFn<D>>) -> Self {
        let indices_iter = sampler.iter(dataset.len());
        Self {
            dataset,
            batch_size: batch_size.max(1),
            sampler,
            drop_last,
            collate_fn,
            indices_iter,
        }
    }

    /// Batches per epoch, honouring `drop_last`.
    pub fn num_batches(&self) -> usize {
        let samples = self.sampler.len(self.dataset.len());
        if self.drop_last {
            samples / self.batch_size
        } else {
            samples.div_ceil(self.batch_size)
        }
    }

    pub fn reset(&mut self) {
        trace!("DataLoader: starting a new epoch over {} item(s)", self.dataset.len());
        self.indices_iter = self.sampler.iter(self.dataset.len());
    }
}

impl<D: Dataset, S: Sampler> Iterator for DataLoader<D, S> {
    type Item = Result<Vec<<D as Dataset>::Item>, DeltaGraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for idx in self.indices_iter.by_ref().take(self.batch_size) {
            match self.dataset.get(idx) {
                Ok(item) => batch.push(item),
                Err(e) => return Some(Err(e)),
            }
        }
        if batch.is_empty() || (self.drop_last && batch.len() < self.batch_size) {
            return None;
        }
        match self.collate_fn {
            Some(ref collate_fn) => Some(collate_fn(batch)),
            None => Some(Ok(batch)),
        }
    }
}

#[cfg(test)]
#[path = "dataloader_test.rs"]
mod tests;
