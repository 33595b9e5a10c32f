pub mod nvml;
pub mod source;

pub use nvml::NvmlDriver;
pub use source::AcceleratorSource;

use crate::error::Result;

/// Vendor accelerator runtime exposing a cumulative energy counter
pub trait AcceleratorDriver: Send + Sync {
    /// Bring the runtime up; called once when monitoring launches
    fn init(&self) -> Result<()>;

    /// Total energy consumed by `device_id` since driver load, in milli-joules
    fn read_raw_energy(&self, device_id: u32) -> Result<u64>;

    /// Release the runtime; called once when monitoring stops
    fn shutdown(&self) -> Result<()>;
}
