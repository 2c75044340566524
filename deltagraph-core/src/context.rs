//! Execution context passed to every `eval` and `accumulate`.

use crate::device::{DeviceBackend, HostBackend};
use crate::error::DeltaGraphError;
use crate::tensor::utils::round_through;
use log::info;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEVICE_ENV: &str = "DELTAGRAPH_DEVICE";
pub const PRECISION_ENV: &str = "DELTAGRAPH_PRECISION";

/// Numeric precision of values staged to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Double,
    /// Values are rounded through `f32` on the way to the device.
    Single,
}

impl Precision {
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::Double => value,
            Precision::Single => round_through::<f32>(value),
        }
    }
}

impl FromStr for Precision {
    type Err = DeltaGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "double" | "f64" => Ok(Precision::Double),
            "single" | "f32" => Ok(Precision::Single),
            other => Err(DeltaGraphError::Configuration(format!(
                "unknown precision '{}' (expected double or single)",
                other
            ))),
        }
    }
}

/// Which device a pass runs on and how values are staged there.
///
/// Cheap to clone. Nothing about a device is remembered between calls:
/// every device operation re-binds from the context it is given.
#[derive(Clone)]
pub struct ExecutionContext {
    backend: Arc<dyn DeviceBackend>,
    device: usize,
    precision: Precision,
}

impl ExecutionContext {
    /// Single simulated host device, double precision.
    pub fn host() -> Self {
        ExecutionContext {
            backend: Arc::new(HostBackend::new(1)),
            device: 0,
            precision: Precision::Double,
        }
    }

    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    /// Reads `DELTAGRAPH_DEVICE` (`host`, `host:N` or `cuda:N`) and
    /// `DELTAGRAPH_PRECISION` (`double` or `single`). Missing variables fall
    /// back to the host device and double precision.
    pub fn from_env() -> Result<Self, DeltaGraphError> {
        let device = std::env::var(DEVICE_ENV).ok();
        let precision = std::env::var(PRECISION_ENV).ok();
        Self::from_settings(device.as_deref(), precision.as_deref())
    }

    pub(crate) fn from_settings(device: Option<&str>, precision: Option<&str>) -> Result<Self, DeltaGraphError> {
        let precision = match precision {
            Some(p) => p.parse()?,
            None => Precision::Double,
        };
        let spec = device.unwrap_or("host");
        let (kind, index) = match spec.split_once(':') {
            Some((kind, index)) => {
                let index = index.trim().parse::<usize>().map_err(|_| {
                    DeltaGraphError::Configuration(format!("invalid device index in '{}'", spec))
                })?;
                (kind.trim().to_ascii_lowercase(), index)
            }
            None => (spec.trim().to_ascii_lowercase(), 0),
        };
        let backend: Arc<dyn DeviceBackend> = match kind.as_str() {
            "host" | "cpu" => Arc::new(HostBackend::new(index + 1)),
            "cuda" => cuda_backend()?,
            other => {
                return Err(DeltaGraphError::Configuration(format!(
                    "unknown device kind '{}'",
                    other
                )))
            }
        };
        let ctx = Self::builder()
            .backend(backend)
            .device(index)
            .precision(precision)
            .build()?;
        info!("Execution context from environment: {:?}", ctx);
        Ok(ctx)
    }

    pub fn backend(&self) -> &dyn DeviceBackend {
        self.backend.as_ref()
    }

    pub fn shared_backend(&self) -> Arc<dyn DeviceBackend> {
        Arc::clone(&self.backend)
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Same backend and precision, another device.
    pub fn with_device(&self, device: usize) -> Result<Self, DeltaGraphError> {
        ExecutionContextBuilder {
            backend: Some(Arc::clone(&self.backend)),
            device,
            precision: self.precision,
        }
        .build()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("backend", &self.backend.name())
            .field("device", &self.device)
            .field("precision", &self.precision)
            .finish()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::host()
    }
}

#[derive(Debug, Default)]
pub struct ExecutionContextBuilder {
    backend: Option<Arc<dyn DeviceBackend>>,
    device: usize,
    precision: Precision,
}

impl ExecutionContextBuilder {
    pub fn backend(mut self, backend: Arc<dyn DeviceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn build(self) -> Result<ExecutionContext, DeltaGraphError> {
        let backend = self.backend.unwrap_or_else(|| Arc::new(HostBackend::new(1)));
        if self.device >= backend.device_count() {
            return Err(DeltaGraphError::Configuration(format!(
                "device {} requested but backend '{}' has {} device(s)",
                self.device,
                backend.name(),
                backend.device_count()
            )));
        }
        Ok(ExecutionContext {
            backend,
            device: self.device,
            precision: self.precision,
        })
    }
}

#[cfg(feature = "cuda")]
fn cuda_backend() -> Result<Arc<dyn DeviceBackend>, DeltaGraphError> {
    let backend = crate::device::CudaBackend::new().map_err(|e| DeltaGraphError::Component {
        operation: "cuda_init".to_string(),
        shapes: Vec::new(),
        source: e,
    })?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "cuda"))]
fn cuda_backend() -> Result<Arc<dyn DeviceBackend>, DeltaGraphError> {
    Err(DeltaGraphError::Configuration(
        "cuda device requested but deltagraph-core was built without the `cuda` feature".to_string(),
    ))
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
