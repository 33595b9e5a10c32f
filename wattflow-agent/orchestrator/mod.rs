pub mod meter;

pub use meter::{MeterBackends, PowerMeter};
