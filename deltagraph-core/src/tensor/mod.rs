// src/tensor/mod.rs

use crate::error::DeltaGraphError;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

mod debug;
pub mod list;
pub mod utils;

pub use list::TensorList;
use utils::{calculate_strides, offset_of};

/// Dense n-dimensional array of `f64` values, addressed row-major
/// (last dimension fastest-varying).
///
/// A `Tensor` is a plain value: cloning copies the buffer. Once produced by a
/// layer it is treated as immutable; the only in-place mutation used by the
/// engine is [`Tensor::add_assign`] on gradient accumulators.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRecord")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Unvalidated serialized form; converted through `Tensor::new`.
#[derive(Deserialize)]
struct TensorRecord {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<TensorRecord> for Tensor {
    type Error = DeltaGraphError;

    fn try_from(record: TensorRecord) -> Result<Self, Self::Error> {
        Tensor::new(record.data, record.shape)
    }
}

impl Tensor {
    /// Creates a tensor from row-major data.
    ///
    /// # Errors
    /// Returns `DeltaGraphError::TensorCreation` if `data.len()` is not the
    /// product of `shape`.
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, DeltaGraphError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(DeltaGraphError::TensorCreation {
                data_len: data.len(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Creates a one-element tensor of shape `[1]`.
    pub fn scalar(value: f64) -> Self {
        Tensor {
            shape: vec![1],
            data: vec![value],
        }
    }

    /// Creates a 1-d tensor from a slice.
    pub fn vector(values: &[f64]) -> Self {
        Tensor {
            shape: vec![values.len()],
            data: values.to_vec(),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn full(shape: &[usize], value: f64) -> Self {
        let numel = shape.iter().product();
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; numel],
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape)
    }

    /// Creates a tensor with elements drawn from `N(0, std²)`.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], std: f64, rng: &mut R) -> Result<Self, DeltaGraphError> {
        let normal = Normal::new(0.0, std)
            .map_err(|e| DeltaGraphError::Configuration(format!("invalid std {}: {}", std, e)))?;
        let numel: usize = shape.iter().product();
        let data = (0..numel).map(|_| normal.sample(rng)).collect();
        Ok(Tensor {
            shape: shape.to_vec(),
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn strides(&self) -> Vec<usize> {
        calculate_strides(&self.shape)
    }

    /// Flat row-major view of the elements.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable flat view. This is how an optimizer writes a parameter buffer.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Reads the element at a multi-index.
    pub fn get(&self, index: &[usize]) -> Result<f64, DeltaGraphError> {
        let offset = offset_of(index, &self.shape)?;
        Ok(self.data[offset])
    }

    pub fn set(&mut self, index: &[usize], value: f64) -> Result<(), DeltaGraphError> {
        let offset = offset_of(index, &self.shape)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Element-wise in-place accumulation, used for gradient buffers.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<(), DeltaGraphError> {
        self.check_same_shape(other, "add_assign")?;
        for (acc, v) in self.data.iter_mut().zip(other.data.iter()) {
            *acc += *v;
        }
        Ok(())
    }

    /// Returns `self + other` as a new tensor.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, DeltaGraphError> {
        let mut out = self.clone();
        out.add_assign(other)?;
        Ok(out)
    }

    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|x| x * factor)
    }

    pub fn scale_in_place(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Element-wise `f(self[i], other[i])` over tensors of equal shape.
    pub fn zip_with<F: Fn(f64, f64) -> f64>(&self, other: &Tensor, f: F) -> Result<Tensor, DeltaGraphError> {
        self.check_same_shape(other, "zip_with")?;
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Dot product of the flattened buffers.
    pub fn dot(&self, other: &Tensor) -> Result<f64, DeltaGraphError> {
        self.check_same_shape(other, "dot")?;
        Ok(self.data.iter().zip(other.data.iter()).map(|(a, b)| a * b).sum())
    }

    /// First non-finite element as `(flat_index, value)`, if any.
    pub fn first_non_finite(&self) -> Option<(usize, f64)> {
        self.data
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(i, &v)| (i, v))
    }

    /// Returns a copy with the same data under a new shape of equal size.
    pub fn reshape(&self, shape: Vec<usize>) -> Result<Tensor, DeltaGraphError> {
        Tensor::new(self.data.clone(), shape)
    }

    pub(crate) fn check_same_shape(&self, other: &Tensor, operation: &str) -> Result<(), DeltaGraphError> {
        if self.shape != other.shape {
            return Err(DeltaGraphError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}
