use super::traits::Dataset;
use deltagraph_core::DeltaGraphError;

/// A dataset backed by a plain `Vec`; items are cloned out on access.
#[derive(Debug, Clone)]
pub struct VecDataset<T: Clone + Send + Sync> {
    data: Vec<T>,
}

impl<T: Clone + Send + Sync> VecDataset<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T: Clone + Send + Sync> Dataset for VecDataset<T> {
    type Item = T;

    fn get(&self, index: usize) -> Result<Self::Item, DeltaGraphError> {
        self.data.get(index).cloned().ok_or_else(|| DeltaGraphError::IndexOutOfBounds {
            index: vec![index],
            shape: vec![self.data.len()],
        })
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
#[path = "vec_dataset_test.rs"]
mod tests;
