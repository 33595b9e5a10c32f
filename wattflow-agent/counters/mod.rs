pub mod accel;
pub mod rapl;

pub use accel::{AcceleratorDriver, AcceleratorSource, NvmlDriver};
pub use rapl::{CalibrationFactors, Domain, DomainReader, RaplSource};
