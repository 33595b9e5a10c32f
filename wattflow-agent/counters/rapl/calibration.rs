use wattflow_raw::rapl::{
    ENERGY_COUNTER_BITS, ENERGY_STATUS_UNITS, POWER_UNITS, RAPL_POWER_UNIT, TIME_UNITS,
};

use crate::common::RegisterReader;
use crate::error::Result;

/// Machine-specific RAPL unit scales, from `MSR_RAPL_POWER_UNIT`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationFactors {
    /// Watts per power-field LSB
    pub power_scale: f64,
    /// Joules per energy-counter LSB
    pub energy_scale: f64,
    /// Seconds per time-field LSB
    pub time_scale: f64,
    /// Joules at which a 32-bit energy counter rolls over
    pub energy_wrap_modulus: f64,
}

fn unit_scale(exponent: u64) -> f64 {
    0.5f64.powi(exponent as i32)
}

impl CalibrationFactors {
    pub fn from_exponents(power: u64, energy: u64, time: u64) -> Self {
        let energy_scale = unit_scale(energy);
        Self {
            power_scale: unit_scale(power),
            energy_scale,
            time_scale: unit_scale(time),
            energy_wrap_modulus: (1u64 << ENERGY_COUNTER_BITS) as f64 * energy_scale,
        }
    }

    /// Decode a raw `MSR_RAPL_POWER_UNIT` value
    pub fn from_register(raw: u64) -> Self {
        let field = |name: &str| RAPL_POWER_UNIT.field(raw, name).unwrap_or_default();
        Self::from_exponents(
            field(POWER_UNITS),
            field(ENERGY_STATUS_UNITS),
            field(TIME_UNITS),
        )
    }

    /// Read and decode the unit register on `core`
    ///
    /// Idempotent for a given machine. Register access failures are returned
    /// as-is; there is no fallback unit.
    pub fn compute<R: RegisterReader + ?Sized>(reader: &R, core: u32) -> Result<Self> {
        let raw = reader.read_raw_register(core, RAPL_POWER_UNIT.address)?;
        let factors = Self::from_register(raw);

        tracing::info!(
            "RAPL units on core {}: power {} W, energy {} J, time {} s (counter wraps at {:.1} J)",
            core,
            factors.power_scale,
            factors.energy_scale,
            factors.time_scale,
            factors.energy_wrap_modulus
        );

        Ok(factors)
    }
}
