//! Host-memory backend: simulated devices with per-thread binding,
//! allocation accounting and fault injection.

use super::{check_launch_shapes, BufferHandle, DeviceBackend, DeviceError, Kernel};
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

static NEXT_BACKEND_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // backend instance id -> bound device
    static BINDINGS: RefCell<HashMap<u64, usize>> = RefCell::new(HashMap::new());
}

#[derive(Debug)]
struct Allocation {
    device: usize,
    data: Vec<f64>,
}

#[derive(Debug, Default)]
struct HostState {
    next_handle: u64,
    allocations: HashMap<u64, Allocation>,
}

/// Runs "device" work in host memory.
///
/// Every operation checks that the calling thread is bound to the device
/// the buffer lives on, like a real driver context would.
#[derive(Debug)]
pub struct HostBackend {
    instance: u64,
    devices: usize,
    state: Mutex<HostState>,
    fail_next_alloc: AtomicBool,
    fail_next_upload: AtomicBool,
    fail_next_launch: AtomicBool,
}

impl HostBackend {
    pub fn new(devices: usize) -> Self {
        let instance = NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed);
        debug!("HostBackend #{} created with {} simulated device(s)", instance, devices);
        HostBackend {
            instance,
            devices,
            state: Mutex::new(HostState::default()),
            fail_next_alloc: AtomicBool::new(false),
            fail_next_upload: AtomicBool::new(false),
            fail_next_launch: AtomicBool::new(false),
        }
    }

    /// Makes the next `alloc` call fail.
    pub fn fail_next_alloc(&self) {
        self.fail_next_alloc.store(true, Ordering::SeqCst);
    }

    /// Makes the next `upload` call fail.
    pub fn fail_next_upload(&self) {
        self.fail_next_upload.store(true, Ordering::SeqCst);
    }

    /// Makes the next `launch` call fail.
    pub fn fail_next_launch(&self) {
        self.fail_next_launch.store(true, Ordering::SeqCst);
    }

    /// Device the calling thread is bound to, if any.
    pub fn bound_device(&self) -> Option<usize> {
        BINDINGS.with(|b| b.borrow().get(&self.instance).copied())
    }

    /// Forgets this thread's binding. Lets tests mimic a pooled thread that
    /// never saw the original binding.
    pub fn unbind_thread(&self) {
        BINDINGS.with(|b| {
            b.borrow_mut().remove(&self.instance);
        });
    }

    /// Total allocations over all devices.
    pub fn total_live_allocations(&self) -> usize {
        self.lock_state().allocations.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().expect("HostBackend state mutex poisoned")
    }

    fn check_bound(&self, device: usize) -> Result<(), DeviceError> {
        match self.bound_device() {
            Some(d) if d == device => Ok(()),
            _ => Err(DeviceError::NotBound(device)),
        }
    }

    fn check_device(&self, device: usize) -> Result<(), DeviceError> {
        if device >= self.devices {
            return Err(DeviceError::InvalidDevice {
                index: device,
                available: self.devices,
            });
        }
        Ok(())
    }

    fn take_fault(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DeviceBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn device_count(&self) -> usize {
        self.devices
    }

    fn bind_thread(&self, device: usize) -> Result<(), DeviceError> {
        self.check_device(device)?;
        BINDINGS.with(|b| {
            b.borrow_mut().insert(self.instance, device);
        });
        trace!("Thread {:?} bound to host device {}", std::thread::current().id(), device);
        Ok(())
    }

    fn alloc(&self, device: usize, len: usize) -> Result<BufferHandle, DeviceError> {
        self.check_device(device)?;
        self.check_bound(device)?;
        if Self::take_fault(&self.fail_next_alloc) {
            warn!("Injected allocation failure on host device {}", device);
            return Err(DeviceError::Allocation {
                device,
                len,
                reason: "injected failure".to_string(),
            });
        }
        let mut state = self.lock_state();
        state.next_handle += 1;
        let id = state.next_handle;
        state.allocations.insert(
            id,
            Allocation {
                device,
                data: vec![0.0; len],
            },
        );
        trace!("Allocated buffer {} ({} elements) on host device {}", id, len, device);
        Ok(BufferHandle { device, id, len })
    }

    fn release(&self, handle: BufferHandle) -> Result<(), DeviceError> {
        let mut state = self.lock_state();
        match state.allocations.remove(&handle.id) {
            Some(_) => {
                trace!("Released buffer {} on host device {}", handle.id, handle.device);
                Ok(())
            }
            None => Err(DeviceError::InvalidHandle(handle.id)),
        }
    }

    fn upload(&self, handle: BufferHandle, data: &[f64]) -> Result<(), DeviceError> {
        self.check_bound(handle.device)?;
        if Self::take_fault(&self.fail_next_upload) {
            warn!("Injected upload failure for buffer {}", handle.id);
            return Err(DeviceError::Transfer("injected failure".to_string()));
        }
        let mut state = self.lock_state();
        let alloc = state
            .allocations
            .get_mut(&handle.id)
            .ok_or(DeviceError::InvalidHandle(handle.id))?;
        if alloc.data.len() != data.len() {
            return Err(DeviceError::Transfer(format!(
                "upload of {} element(s) into buffer {} of {}",
                data.len(),
                handle.id,
                alloc.data.len()
            )));
        }
        alloc.data.copy_from_slice(data);
        Ok(())
    }

    fn download(&self, handle: BufferHandle) -> Result<Vec<f64>, DeviceError> {
        self.check_bound(handle.device)?;
        let state = self.lock_state();
        state
            .allocations
            .get(&handle.id)
            .map(|a| a.data.clone())
            .ok_or(DeviceError::InvalidHandle(handle.id))
    }

    fn launch(&self, kernel: Kernel, inputs: &[BufferHandle], output: BufferHandle) -> Result<(), DeviceError> {
        check_launch_shapes(kernel, inputs, output)?;
        self.check_bound(output.device)?;
        if Self::take_fault(&self.fail_next_launch) {
            warn!("Injected launch failure for kernel {}", kernel.name());
            return Err(DeviceError::Kernel {
                kernel: kernel.name(),
                reason: "injected failure".to_string(),
            });
        }
        // The kernel body runs on rayon, which may steal other launches onto
        // this thread, so the state lock is never held across it.
        let args = {
            let state = self.lock_state();
            match state.allocations.get(&output.id) {
                Some(out) if out.device == output.device => {}
                _ => return Err(DeviceError::InvalidHandle(output.id)),
            }
            inputs
                .iter()
                .map(|h| {
                    state
                        .allocations
                        .get(&h.id)
                        .map(|a| a.data.clone())
                        .ok_or(DeviceError::InvalidHandle(h.id))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let result: Vec<f64> = match kernel {
            Kernel::Forward(op) => args[0].par_iter().map(|&x| op.apply(x)).collect(),
            Kernel::Backward(op) => args[0]
                .par_iter()
                .zip(args[1].par_iter())
                .map(|(&x, &g)| g * op.derivative(x))
                .collect(),
        };
        let mut state = self.lock_state();
        let out = state
            .allocations
            .get_mut(&output.id)
            .ok_or(DeviceError::InvalidHandle(output.id))?;
        out.data = result;
        Ok(())
    }

    fn live_allocations(&self, device: usize) -> usize {
        self.lock_state()
            .allocations
            .values()
            .filter(|a| a.device == device)
            .count()
    }
}
