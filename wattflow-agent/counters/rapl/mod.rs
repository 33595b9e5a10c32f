pub mod calibration;
pub mod domain;

pub use calibration::CalibrationFactors;
pub use domain::{Domain, DomainReader, RaplSource};
