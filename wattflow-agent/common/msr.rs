use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use wattflow_raw::MsrFile;

use crate::error::Result;

/// Raw register access capability
///
/// Implemented by [`MsrDevice`] on real hardware and by fakes in tests.
pub trait RegisterReader: Send + Sync {
    /// Read the 64-bit register at `address` on `core`
    fn read_raw_register(&self, core: u32, address: u64) -> Result<u64>;
}

impl<T: RegisterReader + ?Sized> RegisterReader for Arc<T> {
    fn read_raw_register(&self, core: u32, address: u64) -> Result<u64> {
        (**self).read_raw_register(core, address)
    }
}

/// MSR access through `/dev/cpu/<core>/msr`, keeping one open handle per core
#[derive(Default)]
pub struct MsrDevice {
    handles: RwLock<HashMap<u32, Arc<Mutex<MsrFile>>>>,
}

impl MsrDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_handle(&self, core: u32) -> Result<Arc<Mutex<MsrFile>>> {
        {
            let handles = self.handles.read();
            if let Some(handle) = handles.get(&core) {
                return Ok(Arc::clone(handle));
            }
        }

        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(&core) {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(Mutex::new(MsrFile::open(core)?));
        tracing::info!("Opened MSR device for core {}", core);
        handles.insert(core, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cores with an open handle
    pub fn open_handles(&self) -> usize {
        self.handles.read().len()
    }
}

impl RegisterReader for MsrDevice {
    fn read_raw_register(&self, core: u32, address: u64) -> Result<u64> {
        let handle = self.get_handle(core)?;
        let value = handle.lock().read(address)?;
        tracing::debug!("MSR read: core {} MSR 0x{:03x} = 0x{:016x}", core, address, value);
        Ok(value)
    }
}
