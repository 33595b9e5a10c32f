//! # wattflow-raw
//!
//! Hardware register definitions for RAPL energy measurement.
//!
//! This crate provides table-driven decoding of raw MSR (Model-Specific
//! Register) values, the RAPL register layouts, and a minimal read primitive
//! over the Linux `msr` driver.
//!
//! ## Usage
//!
//! ```ignore
//! use wattflow_raw::rapl;
//! use wattflow_raw::read_msr;
//!
//! let raw = read_msr(0, rapl::RAPL_POWER_UNIT.address)?;
//! let esu = rapl::RAPL_POWER_UNIT.field(raw, rapl::ENERGY_STATUS_UNITS);
//! ```

pub mod msr;
pub mod rapl;
pub mod register;

pub use msr::{read_msr, MsrError, MsrFile, Result};
pub use register::{FieldSpec, RegisterLayout};
