//! CUDA backend built on `cudarc`. Only compiled with the `cuda` feature.

use super::{check_launch_shapes, BufferHandle, DeviceBackend, DeviceError, ElementwiseOp, Kernel};
use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx, Ptx};
use log::{debug, error, info};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MODULE: &str = "deltagraph_elementwise";

const KERNEL_SOURCE: &str = r#"
__device__ double dg_sigmoid(double x) { return 1.0 / (1.0 + exp(-x)); }

extern "C" __global__ void sigmoid_fwd(const double* x, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { out[i] = dg_sigmoid(x[i]); }
}
extern "C" __global__ void relu_fwd(const double* x, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { out[i] = x[i] > 0.0 ? x[i] : 0.0; }
}
extern "C" __global__ void tanh_fwd(const double* x, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { out[i] = tanh(x[i]); }
}
extern "C" __global__ void sigmoid_bwd(const double* x, const double* g, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { double s = dg_sigmoid(x[i]); out[i] = g[i] * s * (1.0 - s); }
}
extern "C" __global__ void relu_bwd(const double* x, const double* g, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { out[i] = x[i] > 0.0 ? g[i] : 0.0; }
}
extern "C" __global__ void tanh_bwd(const double* x, const double* g, double* out, const size_t n) {
    size_t i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { double t = tanh(x[i]); out[i] = g[i] * (1.0 - t * t); }
}
"#;

const KERNEL_NAMES: [&str; 6] = [
    "sigmoid_fwd",
    "relu_fwd",
    "tanh_fwd",
    "sigmoid_bwd",
    "relu_bwd",
    "tanh_bwd",
];

// Compiled once per process.
static PTX: OnceCell<Ptx> = OnceCell::new();

fn driver_error(e: impl std::fmt::Debug) -> String {
    format!("{e:?}")
}

fn kernel_ptx() -> Result<Ptx, DeviceError> {
    PTX.get_or_try_init(|| {
        debug!("Compiling elementwise kernels with NVRTC...");
        compile_ptx(KERNEL_SOURCE).map_err(|e| DeviceError::Initialization(driver_error(e)))
    })
    .cloned()
}

#[derive(Default)]
struct CudaState {
    next_handle: u64,
    buffers: HashMap<u64, CudaSlice<f64>>,
    owners: HashMap<u64, usize>,
}

/// One `cudarc` device per ordinal, each with the elementwise module loaded.
pub struct CudaBackend {
    devices: Vec<Arc<CudaDevice>>,
    state: Mutex<CudaState>,
}

impl std::fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaBackend")
            .field("devices", &self.devices.len())
            .field("live_buffers", &self.lock_state().buffers.len())
            .finish()
    }
}

impl CudaBackend {
    pub fn new() -> Result<Self, DeviceError> {
        let count = CudaDevice::count().map_err(|e| DeviceError::Initialization(driver_error(e)))?;
        if count <= 0 {
            return Err(DeviceError::Initialization("No CUDA devices found".to_string()));
        }
        let ptx = kernel_ptx()?;
        let mut devices = Vec::with_capacity(count as usize);
        for ordinal in 0..count as usize {
            let dev = CudaDevice::new(ordinal).map_err(|e| {
                error!("Failed to open CUDA device {}: {:?}", ordinal, e);
                DeviceError::Initialization(driver_error(e))
            })?;
            dev.load_ptx(ptx.clone(), MODULE, &KERNEL_NAMES)
                .map_err(|e| DeviceError::Initialization(driver_error(e)))?;
            devices.push(dev);
        }
        info!("CUDA backend initialized with {} device(s)", devices.len());
        Ok(CudaBackend {
            devices,
            state: Mutex::new(CudaState::default()),
        })
    }

    fn device(&self, index: usize) -> Result<&Arc<CudaDevice>, DeviceError> {
        self.devices.get(index).ok_or(DeviceError::InvalidDevice {
            index,
            available: self.devices.len(),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CudaState> {
        self.state.lock().expect("CudaBackend state mutex poisoned")
    }

    fn kernel_name(kernel: Kernel) -> &'static str {
        match kernel {
            Kernel::Forward(ElementwiseOp::Sigmoid) => "sigmoid_fwd",
            Kernel::Forward(ElementwiseOp::Relu) => "relu_fwd",
            Kernel::Forward(ElementwiseOp::Tanh) => "tanh_fwd",
            Kernel::Backward(ElementwiseOp::Sigmoid) => "sigmoid_bwd",
            Kernel::Backward(ElementwiseOp::Relu) => "relu_bwd",
            Kernel::Backward(ElementwiseOp::Tanh) => "tanh_bwd",
        }
    }
}

impl DeviceBackend for CudaBackend {
    fn name(&self) -> &str {
        "cuda"
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn bind_thread(&self, device: usize) -> Result<(), DeviceError> {
        self.device(device)?
            .bind_to_thread()
            .map_err(|e| DeviceError::Initialization(driver_error(e)))
    }

    fn alloc(&self, device: usize, len: usize) -> Result<BufferHandle, DeviceError> {
        let slice = self
            .device(device)?
            .alloc_zeros::<f64>(len)
            .map_err(|e| DeviceError::Allocation {
                device,
                len,
                reason: driver_error(e),
            })?;
        let mut state = self.lock_state();
        state.next_handle += 1;
        let id = state.next_handle;
        state.buffers.insert(id, slice);
        state.owners.insert(id, device);
        Ok(BufferHandle { device, id, len })
    }

    fn release(&self, handle: BufferHandle) -> Result<(), DeviceError> {
        // Dropping the slice frees device memory.
        let mut state = self.lock_state();
        state.owners.remove(&handle.id);
        state
            .buffers
            .remove(&handle.id)
            .map(drop)
            .ok_or(DeviceError::InvalidHandle(handle.id))
    }

    fn upload(&self, handle: BufferHandle, data: &[f64]) -> Result<(), DeviceError> {
        let dev = self.device(handle.device)?;
        let mut state = self.lock_state();
        let slice = state
            .buffers
            .get_mut(&handle.id)
            .ok_or(DeviceError::InvalidHandle(handle.id))?;
        dev.htod_sync_copy_into(data, slice)
            .map_err(|e| DeviceError::Transfer(driver_error(e)))
    }

    fn download(&self, handle: BufferHandle) -> Result<Vec<f64>, DeviceError> {
        let dev = self.device(handle.device)?;
        let state = self.lock_state();
        let slice = state
            .buffers
            .get(&handle.id)
            .ok_or(DeviceError::InvalidHandle(handle.id))?;
        dev.dtoh_sync_copy(slice)
            .map_err(|e| DeviceError::Transfer(driver_error(e)))
    }

    fn launch(&self, kernel: Kernel, inputs: &[BufferHandle], output: BufferHandle) -> Result<(), DeviceError> {
        check_launch_shapes(kernel, inputs, output)?;
        let dev = self.device(output.device)?;
        let name = Self::kernel_name(kernel);
        let func = dev.get_func(MODULE, name).ok_or_else(|| DeviceError::Kernel {
            kernel: kernel.name(),
            reason: "kernel not loaded".to_string(),
        })?;
        let mut state = self.lock_state();
        let mut out = state
            .buffers
            .remove(&output.id)
            .ok_or(DeviceError::InvalidHandle(output.id))?;
        let cfg = LaunchConfig::for_num_elems(output.len as u32);
        let n = output.len;
        let result = match inputs {
            [x] => match state.buffers.get(&x.id) {
                Some(x) => unsafe { func.launch(cfg, (x, &mut out, n)) },
                None => {
                    state.buffers.insert(output.id, out);
                    return Err(DeviceError::InvalidHandle(inputs[0].id));
                }
            },
            [x, g] => match (state.buffers.get(&x.id), state.buffers.get(&g.id)) {
                (Some(x), Some(g)) => unsafe { func.launch(cfg, (x, g, &mut out, n)) },
                _ => {
                    state.buffers.insert(output.id, out);
                    return Err(DeviceError::InvalidHandle(inputs[0].id));
                }
            },
            _ => {
                state.buffers.insert(output.id, out);
                return Err(DeviceError::Kernel {
                    kernel: kernel.name(),
                    reason: format!("unsupported input count {}", inputs.len()),
                });
            }
        };
        state.buffers.insert(output.id, out);
        result.map_err(|e| DeviceError::Kernel {
            kernel: kernel.name(),
            reason: driver_error(e),
        })?;
        dev.synchronize().map_err(|e| DeviceError::Kernel {
            kernel: kernel.name(),
            reason: driver_error(e),
        })
    }

    fn live_allocations(&self, device: usize) -> usize {
        self.lock_state()
            .owners
            .values()
            .filter(|&&d| d == device)
            .count()
    }
}
