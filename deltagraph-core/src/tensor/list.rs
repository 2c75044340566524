// src/tensor/list.rs

use crate::error::DeltaGraphError;
use crate::tensor::Tensor;
use std::fmt;
use std::sync::Arc;

/// An ordered mini-batch of same-shaped tensors.
///
/// The list is shared: cloning a `TensorList` clones an `Arc`, never the
/// tensors. It is never mutated after construction; arithmetic returns a new
/// list.
#[derive(Clone, PartialEq)]
pub struct TensorList {
    items: Arc<Vec<Tensor>>,
}

impl TensorList {
    /// Builds a list, checking it is non-empty and that every item has the
    /// shape of the first.
    pub fn new(items: Vec<Tensor>) -> Result<Self, DeltaGraphError> {
        let first = items.first().ok_or(DeltaGraphError::EmptyTensorList)?;
        let expected = first.shape().to_vec();
        if let Some(bad) = items.iter().find(|t| t.shape() != expected.as_slice()) {
            return Err(DeltaGraphError::ShapeMismatch {
                expected,
                actual: bad.shape().to_vec(),
                operation: "TensorList::new".to_string(),
            });
        }
        Ok(TensorList {
            items: Arc::new(items),
        })
    }

    pub fn single(tensor: Tensor) -> Self {
        TensorList {
            items: Arc::new(vec![tensor]),
        }
    }

    /// Splits a flat row-major buffer of `batch` items of `item_shape` each.
    pub fn from_flat(data: &[f64], batch: usize, item_shape: &[usize]) -> Result<Self, DeltaGraphError> {
        let item_len: usize = item_shape.iter().product();
        if batch == 0 {
            return Err(DeltaGraphError::EmptyTensorList);
        }
        if data.len() != batch * item_len {
            let mut shape = vec![batch];
            shape.extend_from_slice(item_shape);
            return Err(DeltaGraphError::TensorCreation {
                data_len: data.len(),
                shape,
            });
        }
        let items = (0..batch)
            .map(|i| Tensor::new(data[i * item_len..(i + 1) * item_len].to_vec(), item_shape.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false for a constructed list; kept for API symmetry with `Vec`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Tensor] {
        &self.items
    }

    pub fn item_shape(&self) -> &[usize] {
        self.items[0].shape()
    }

    /// `[batch, item_shape...]`, used in error reports and device staging.
    pub fn batch_shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.item_shape().len() + 1);
        shape.push(self.len());
        shape.extend_from_slice(self.item_shape());
        shape
    }

    pub fn zeros_like(&self) -> Self {
        TensorList {
            items: Arc::new(self.items.iter().map(Tensor::zeros_like).collect()),
        }
    }

    /// Item-wise sum of two lists of identical length and shape.
    pub fn add(&self, other: &TensorList) -> Result<TensorList, DeltaGraphError> {
        self.check_compatible(other, "TensorList::add")?;
        let items = self
            .items
            .iter()
            .zip(other.items.iter())
            .map(|(a, b)| a.add(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TensorList {
            items: Arc::new(items),
        })
    }

    pub fn scale(&self, factor: f64) -> TensorList {
        self.map_items(|t| t.scale(factor))
    }

    pub fn map_items<F: Fn(&Tensor) -> Tensor>(&self, f: F) -> TensorList {
        TensorList {
            items: Arc::new(self.items.iter().map(f).collect()),
        }
    }

    /// Concatenates all items into one row-major buffer.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len() * self.items[0].numel());
        for t in self.items.iter() {
            out.extend_from_slice(t.data());
        }
        out
    }

    /// True when both lists share the same allocation.
    pub fn ptr_eq(&self, other: &TensorList) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    pub(crate) fn check_compatible(&self, other: &TensorList, operation: &str) -> Result<(), DeltaGraphError> {
        if self.len() != other.len() {
            return Err(DeltaGraphError::BatchMismatch {
                expected: self.len(),
                actual: other.len(),
                operation: operation.to_string(),
            });
        }
        if self.item_shape() != other.item_shape() {
            return Err(DeltaGraphError::ShapeMismatch {
                expected: self.item_shape().to_vec(),
                actual: other.item_shape().to_vec(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for TensorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorList(len={}, item_shape={:?})", self.len(), self.item_shape())
    }
}

impl<'a> IntoIterator for &'a TensorList {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[path = "list_test.rs"]
mod tests;
