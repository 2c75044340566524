use std::fmt::Debug;

/// Decides the order in which a `DataLoader` visits dataset indices.
pub trait Sampler: Debug + Send + Sync {
    /// A fresh index stream for one epoch over `dataset_len` items.
    fn iter(&self, dataset_len: usize) -> Box<dyn Iterator<Item = usize> + Send + Sync>;

    /// Number of indices `iter` yields. May differ from `dataset_len` when a
    /// fixed sample count or a subset is configured.
    fn len(&self, dataset_len: usize) -> usize;
}
