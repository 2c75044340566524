//! Device backends and the scoped lifecycle of device-resident buffers.
//!
//! A layer that computes on an accelerator never touches a backend directly:
//! it opens a [`DeviceScope`] from its [`ExecutionContext`](crate::context::ExecutionContext),
//! stages whole batches into [`DeviceBuffer`]s and launches kernels through
//! the scope. Buffers are released when they drop, on every exit path.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

pub mod host;
pub mod scope;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use host::HostBackend;
pub use scope::{DeviceBuffer, DeviceScope};

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

/// Errors raised by a device backend. They never escape a pass unwrapped:
/// [`DeviceScope`] turns them into `DeltaGraphError::Component`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Invalid device index {index} ({available} device(s) available)")]
    InvalidDevice { index: usize, available: usize },

    #[error("Thread is not bound to device {0}")]
    NotBound(usize),

    #[error("Allocation of {len} element(s) on device {device} failed: {reason}")]
    Allocation {
        device: usize,
        len: usize,
        reason: String,
    },

    #[error("Unknown or already released buffer {0}")]
    InvalidHandle(u64),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Kernel {kernel} failed: {reason}")]
    Kernel { kernel: String, reason: String },

    #[error("Backend initialization failed: {0}")]
    Initialization(String),
}

/// Element-wise operations every backend can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementwiseOp {
    Sigmoid,
    Relu,
    Tanh,
}

impl ElementwiseOp {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            ElementwiseOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ElementwiseOp::Relu => x.max(0.0),
            ElementwiseOp::Tanh => x.tanh(),
        }
    }

    /// Derivative at `x`. The ReLU subgradient at 0 is 0.
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            ElementwiseOp::Sigmoid => {
                let s = self.apply(x);
                s * (1.0 - s)
            }
            ElementwiseOp::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ElementwiseOp::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementwiseOp::Sigmoid => "sigmoid",
            ElementwiseOp::Relu => "relu",
            ElementwiseOp::Tanh => "tanh",
        }
    }
}

/// A kernel launch request.
///
/// `Forward(op)` reads one input `x` and writes `op(x)`.
/// `Backward(op)` reads `x` and an upstream gradient `g` and writes
/// `g * op'(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Forward(ElementwiseOp),
    Backward(ElementwiseOp),
}

impl Kernel {
    pub fn arity(self) -> usize {
        match self {
            Kernel::Forward(_) => 1,
            Kernel::Backward(_) => 2,
        }
    }

    pub fn name(self) -> String {
        match self {
            Kernel::Forward(op) => format!("{}_fwd", op.name()),
            Kernel::Backward(op) => format!("{}_bwd", op.name()),
        }
    }
}

/// Opaque reference to one backend allocation of `len` f64 elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub device: usize,
    pub id: u64,
    pub len: usize,
}

/// A compute device family. Implementations must be usable from many
/// threads; binding is per thread and must be re-established by every
/// caller since pooled threads do not keep it.
pub trait DeviceBackend: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn device_count(&self) -> usize;

    /// Makes `device` current for the calling thread.
    fn bind_thread(&self, device: usize) -> Result<(), DeviceError>;

    /// Allocates `len` zero-initialized elements on `device`.
    fn alloc(&self, device: usize, len: usize) -> Result<BufferHandle, DeviceError>;

    fn release(&self, handle: BufferHandle) -> Result<(), DeviceError>;

    /// Copies `data` (exactly `handle.len` elements) to the device.
    fn upload(&self, handle: BufferHandle, data: &[f64]) -> Result<(), DeviceError>;

    fn download(&self, handle: BufferHandle) -> Result<Vec<f64>, DeviceError>;

    /// Runs `kernel` over equally sized `inputs`, writing into `output`.
    fn launch(&self, kernel: Kernel, inputs: &[BufferHandle], output: BufferHandle) -> Result<(), DeviceError>;

    /// Number of allocations currently held on `device`.
    fn live_allocations(&self, device: usize) -> usize;
}

pub(crate) fn check_launch_shapes(kernel: Kernel, inputs: &[BufferHandle], output: BufferHandle) -> Result<(), DeviceError> {
    if inputs.len() != kernel.arity() {
        return Err(DeviceError::Kernel {
            kernel: kernel.name(),
            reason: format!("expected {} input buffer(s), got {}", kernel.arity(), inputs.len()),
        });
    }
    if let Some(bad) = inputs.iter().find(|h| h.len != output.len || h.device != output.device) {
        return Err(DeviceError::Kernel {
            kernel: kernel.name(),
            reason: format!(
                "input buffer {} ({} elements, device {}) does not match output ({} elements, device {})",
                bad.id, bad.len, bad.device, output.len, output.device
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "device_test.rs"]
mod tests;
