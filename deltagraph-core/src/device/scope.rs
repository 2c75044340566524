//! Scoped acquisition of device resources.

use super::{BufferHandle, DeviceBackend, DeviceError, Kernel};
use crate::context::ExecutionContext;
use crate::error::DeltaGraphError;
use crate::tensor::TensorList;
use log::{debug, error};

/// One device operation in progress: the calling thread is bound to the
/// context's device for as long as the scope lives.
///
/// Every backend failure inside the scope comes out as
/// `DeltaGraphError::Component`, tagged with the operation name and the
/// shapes staged so far.
pub struct DeviceScope<'a> {
    ctx: &'a ExecutionContext,
    operation: String,
    shapes: Vec<Vec<usize>>,
}

impl<'a> DeviceScope<'a> {
    /// Binds the calling thread to `ctx`'s device. Done on every call: a
    /// pooled thread may never have seen a previous binding.
    pub fn open(ctx: &'a ExecutionContext, operation: impl Into<String>) -> Result<Self, DeltaGraphError> {
        let operation = operation.into();
        debug!(
            "Opening device scope '{}' on {} device {}",
            operation,
            ctx.backend().name(),
            ctx.device()
        );
        let scope = DeviceScope {
            ctx,
            operation,
            shapes: Vec::new(),
        };
        ctx.backend()
            .bind_thread(ctx.device())
            .map_err(|e| scope.component_error(e))?;
        Ok(scope)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn backend(&self) -> &'a dyn DeviceBackend {
        self.ctx.backend()
    }

    fn component_error(&self, source: DeviceError) -> DeltaGraphError {
        error!("Device operation '{}' failed: {}", self.operation, source);
        DeltaGraphError::Component {
            operation: self.operation.clone(),
            shapes: self.shapes.clone(),
            source,
        }
    }

    /// Allocates a zeroed buffer for a batch of the given shape.
    pub fn alloc(&mut self, batch_shape: &[usize]) -> Result<DeviceBuffer<'a>, DeltaGraphError> {
        self.shapes.push(batch_shape.to_vec());
        let len = batch_shape.iter().product();
        let handle = self
            .backend()
            .alloc(self.ctx.device(), len)
            .map_err(|e| self.component_error(e))?;
        Ok(DeviceBuffer {
            backend: self.backend(),
            handle,
            shape: batch_shape.to_vec(),
        })
    }

    /// Copies the whole batch into one contiguous device allocation,
    /// rounding through the context's precision.
    pub fn stage(&mut self, list: &TensorList) -> Result<DeviceBuffer<'a>, DeltaGraphError> {
        let buffer = self.alloc(&list.batch_shape())?;
        let precision = self.ctx.precision();
        let host: Vec<f64> = list.flatten().into_iter().map(|v| precision.round(v)).collect();
        self.backend()
            .upload(buffer.handle, &host)
            .map_err(|e| self.component_error(e))?;
        Ok(buffer)
    }

    /// Copies a buffer back as a batch of `shape[0]` items.
    pub fn fetch(&self, buffer: &DeviceBuffer<'_>) -> Result<TensorList, DeltaGraphError> {
        let data = self
            .backend()
            .download(buffer.handle)
            .map_err(|e| self.component_error(e))?;
        let (batch, item_shape) = buffer
            .shape
            .split_first()
            .ok_or(DeltaGraphError::EmptyTensorList)?;
        TensorList::from_flat(&data, *batch, item_shape)
    }

    pub fn launch(
        &self,
        kernel: Kernel,
        inputs: &[&DeviceBuffer<'_>],
        output: &DeviceBuffer<'_>,
    ) -> Result<(), DeltaGraphError> {
        let handles: Vec<BufferHandle> = inputs.iter().map(|b| b.handle).collect();
        self.backend()
            .launch(kernel, &handles, output.handle)
            .map_err(|e| self.component_error(e))
    }
}

impl Drop for DeviceScope<'_> {
    fn drop(&mut self) {
        debug!("Closing device scope '{}'", self.operation);
    }
}

/// A device allocation owned by the current scope. Released on drop.
#[derive(Debug)]
pub struct DeviceBuffer<'a> {
    backend: &'a dyn DeviceBackend,
    handle: BufferHandle,
    shape: Vec<usize>,
}

impl DeviceBuffer<'_> {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.handle.len
    }

    pub fn is_empty(&self) -> bool {
        self.handle.len == 0
    }
}

impl Drop for DeviceBuffer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.release(self.handle) {
            error!("Failed to release device buffer {}: {}", self.handle.id, e);
        }
    }
}

#[cfg(test)]
#[path = "scope_test.rs"]
mod tests;
