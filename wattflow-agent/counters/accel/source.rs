use std::sync::Arc;

use crate::counters::accel::AcceleratorDriver;
use crate::error::Result;
use crate::metrics::{EnergySource, Source};

const JOULES_PER_MILLIJOULE: f64 = 1e-3;

/// One accelerator device as a single-node accountant source
pub struct AcceleratorSource {
    driver: Arc<dyn AcceleratorDriver>,
    device_id: u32,
}

impl AcceleratorSource {
    pub fn new(driver: Arc<dyn AcceleratorDriver>, device_id: u32) -> Self {
        Self { driver, device_id }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl EnergySource for AcceleratorSource {
    fn source(&self) -> Source {
        Source::Accelerator
    }

    fn node_count(&self) -> usize {
        1
    }

    fn wrap_modulus(&self) -> f64 {
        // 64-bit milli-joule counter
        u64::MAX as f64 * JOULES_PER_MILLIJOULE
    }

    fn read_energy(&mut self, out: &mut [f64]) -> Result<()> {
        let millijoules = self.driver.read_raw_energy(self.device_id)?;
        out[0] = millijoules as f64 * JOULES_PER_MILLIJOULE;
        Ok(())
    }
}
