use super::traits::Dataset;
use deltagraph_core::{DeltaGraphError, Tensor};

/// Feature/label pairs for supervised training.
///
/// All features share one shape and all labels share one shape, so any
/// subset of items can be stacked into the two `TensorList`s a training
/// network expects.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    features: Vec<Tensor>,
    labels: Vec<Tensor>,
}

impl LabeledDataset {
    /// # Errors
    ///
    /// `BatchMismatch` if the two vectors differ in length, `ShapeMismatch`
    /// if a feature or label disagrees with the first one's shape.
    pub fn new(features: Vec<Tensor>, labels: Vec<Tensor>) -> Result<Self, DeltaGraphError> {
        if features.len() != labels.len() {
            return Err(DeltaGraphError::BatchMismatch {
                expected: features.len(),
                actual: labels.len(),
                operation: "LabeledDataset::new".to_string(),
            });
        }
        check_uniform(&features, "LabeledDataset::new (features)")?;
        check_uniform(&labels, "LabeledDataset::new (labels)")?;
        Ok(LabeledDataset { features, labels })
    }

    /// Builds `len` items by calling `f` with each index.
    pub fn from_fn<F>(len: usize, mut f: F) -> Result<Self, DeltaGraphError>
    where
        F: FnMut(usize) -> (Tensor, Tensor),
    {
        let (features, labels): (Vec<Tensor>, Vec<Tensor>) = (0..len).map(&mut f).unzip();
        Self::new(features, labels)
    }

    pub fn feature_shape(&self) -> Option<&[usize]> {
        self.features.first().map(Tensor::shape)
    }

    pub fn label_shape(&self) -> Option<&[usize]> {
        self.labels.first().map(Tensor::shape)
    }

    /// Every item in index order.
    pub fn items(&self) -> Vec<(Tensor, Tensor)> {
        self.features.iter().cloned().zip(self.labels.iter().cloned()).collect()
    }
}

fn check_uniform(tensors: &[Tensor], operation: &str) -> Result<(), DeltaGraphError> {
    if let Some(first) = tensors.first() {
        if let Some(odd) = tensors.iter().find(|t| t.shape() != first.shape()) {
            return Err(DeltaGraphError::ShapeMismatch {
                expected: first.shape().to_vec(),
                actual: odd.shape().to_vec(),
                operation: operation.to_string(),
            });
        }
    }
    Ok(())
}

impl Dataset for LabeledDataset {
    type Item = (Tensor, Tensor);

    fn get(&self, index: usize) -> Result<Self::Item, DeltaGraphError> {
        match (self.features.get(index), self.labels.get(index)) {
            (Some(x), Some(y)) => Ok((x.clone(), y.clone())),
            _ => Err(DeltaGraphError::IndexOutOfBounds {
                index: vec![index],
                shape: vec![self.features.len()],
            }),
        }
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
#[path = "labeled_dataset_test.rs"]
mod tests;
