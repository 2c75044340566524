// src/tensor/debug.rs
use crate::tensor::Tensor;
use std::fmt;

const PREVIEW: usize = 8;

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?}, data=", self.shape())?;
        let data = self.data();
        if data.len() <= PREVIEW {
            write!(f, "{:?}", data)?;
        } else {
            write!(f, "{:?} ... ~{} elements", &data[..PREVIEW], data.len())?;
        }
        write!(f, ")")
    }
}
