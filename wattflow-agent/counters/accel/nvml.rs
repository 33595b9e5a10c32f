use nvml_wrapper::Nvml;
use parking_lot::Mutex;

use crate::counters::accel::AcceleratorDriver;
use crate::error::{MeterError, Result};

/// NVIDIA accelerators through NVML
///
/// The library handle only exists between `init` and `shutdown`; reads
/// outside that window fail with a driver error.
#[derive(Default)]
pub struct NvmlDriver {
    nvml: Mutex<Option<Nvml>>,
}

impl NvmlDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.nvml.lock().is_some()
    }
}

impl AcceleratorDriver for NvmlDriver {
    fn init(&self) -> Result<()> {
        let mut slot = self.nvml.lock();
        if slot.is_some() {
            tracing::warn!("NVML already initialized");
            return Ok(());
        }

        let nvml = Nvml::init().map_err(|e| {
            MeterError::Accelerator(format!(
                "failed to initialize NVML ({e}); install NVIDIA drivers or disable the GPU source"
            ))
        })?;

        match nvml.device_count() {
            Ok(count) => tracing::info!("NVML initialized, {} device(s)", count),
            Err(e) => tracing::warn!("NVML initialized but device count failed: {}", e),
        }

        *slot = Some(nvml);
        Ok(())
    }

    fn read_raw_energy(&self, device_id: u32) -> Result<u64> {
        let slot = self.nvml.lock();
        let nvml = slot
            .as_ref()
            .ok_or_else(|| MeterError::Accelerator("NVML is not initialized".to_string()))?;

        let device = nvml.device_by_index(device_id)?;
        let millijoules = device.total_energy_consumption()?;
        tracing::trace!("GPU {} total energy {} mJ", device_id, millijoules);
        Ok(millijoules)
    }

    fn shutdown(&self) -> Result<()> {
        match self.nvml.lock().take() {
            Some(nvml) => {
                nvml.shutdown()?;
                tracing::info!("NVML shut down");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
