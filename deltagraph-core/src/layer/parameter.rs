use crate::tensor::Tensor;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A live, shared parameter buffer of a layer.
///
/// Cloning a `Parameter` clones the handle, not the tensor: writes through any
/// clone are seen by the owning layer. Layers read it during `eval`; only an
/// optimizer should write it, and never while a pass is in flight.
#[derive(Clone)]
pub struct Parameter(Arc<RwLock<Tensor>>);

impl Parameter {
    pub fn new(tensor: Tensor) -> Self {
        Parameter(Arc::new(RwLock::new(tensor)))
    }

    /// Acquires a read lock on the buffer.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn read(&self) -> RwLockReadGuard<'_, Tensor> {
        self.0.read().expect("RwLock poisoned")
    }

    /// Acquires a write lock on the buffer.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn write(&self) -> RwLockWriteGuard<'_, Tensor> {
        self.0.write().expect("RwLock poisoned")
    }

    /// Copy of the current value.
    pub fn snapshot(&self) -> Tensor {
        self.read().clone()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.read().shape().to_vec()
    }

    /// Replaces the buffer contents with `value`.
    pub fn assign(&self, value: Tensor) {
        *self.write() = value;
    }

    /// True when both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parameter({:?})", *self.read())
    }
}

#[cfg(test)]
#[path = "parameter_test.rs"]
mod tests;
