//! Data feeding for deltagraph networks: datasets, samplers, batching, and a
//! partitioned trainable that evaluates batches in parallel.

pub mod dataloader;
pub mod datasets;
pub mod samplers;
pub mod trainable;

pub use dataloader::DataLoader;
pub use datasets::{Dataset, LabeledDataset, VecDataset};
pub use samplers::{RandomSampler, Sampler, SequentialSampler, SubsetRandomSampler};
pub use trainable::{PartitionedTrainable, Trainable};
