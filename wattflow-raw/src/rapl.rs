//! RAPL (Running Average Power Limit) register definitions
//!
//! These MSRs are architectural on Intel client and server parts since
//! Sandy Bridge. Energy status counters are 32 bits wide and wrap to zero.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 3B
//! - Section 15.10: Platform Specific Power Management Support

use crate::register::{FieldSpec, RegisterLayout};

/// MSR addresses for RAPL
pub mod msr {
    /// RAPL Power Unit - power, energy and time units
    pub const MSR_RAPL_POWER_UNIT: u64 = 0x606;

    /// Package Energy Status - total package energy consumption
    pub const MSR_PKG_ENERGY_STATUS: u64 = 0x611;

    /// Package Power Info - TDP and limits
    pub const MSR_PKG_POWER_INFO: u64 = 0x614;

    /// PP0 Energy Status - core energy consumption
    pub const MSR_PP0_ENERGY_STATUS: u64 = 0x639;
}

pub const POWER_UNITS: &str = "power_units";
pub const ENERGY_STATUS_UNITS: &str = "energy_status_units";
pub const TIME_UNITS: &str = "time_units";
pub const TOTAL_ENERGY_CONSUMED: &str = "total_energy_consumed";
pub const THERMAL_SPEC_POWER: &str = "thermal_spec_power";
pub const MINIMUM_POWER: &str = "minimum_power";
pub const MAXIMUM_POWER: &str = "maximum_power";
pub const MAXIMUM_TIME_WINDOW: &str = "maximum_time_window";

/// Width of the hardware energy counters
pub const ENERGY_COUNTER_BITS: u32 = 32;

/// | Bits   | Field               | Description                 |
/// |--------|---------------------|-----------------------------|
/// | 0-3    | power_units         | watts = 1/2^PU              |
/// | 8-12   | energy_status_units | joules = 1/2^ESU            |
/// | 16-19  | time_units          | seconds = 1/2^TU            |
pub const RAPL_POWER_UNIT: RegisterLayout = RegisterLayout::new(
    "MSR_RAPL_POWER_UNIT",
    msr::MSR_RAPL_POWER_UNIT,
    &[
        FieldSpec::new(POWER_UNITS, 0, 4),
        FieldSpec::new(ENERGY_STATUS_UNITS, 8, 5),
        FieldSpec::new(TIME_UNITS, 16, 4),
    ],
);

pub const PKG_ENERGY_STATUS: RegisterLayout = RegisterLayout::new(
    "MSR_PKG_ENERGY_STATUS",
    msr::MSR_PKG_ENERGY_STATUS,
    &[FieldSpec::new(
        TOTAL_ENERGY_CONSUMED,
        0,
        ENERGY_COUNTER_BITS,
    )],
);

pub const PP0_ENERGY_STATUS: RegisterLayout = RegisterLayout::new(
    "MSR_PP0_ENERGY_STATUS",
    msr::MSR_PP0_ENERGY_STATUS,
    &[FieldSpec::new(
        TOTAL_ENERGY_CONSUMED,
        0,
        ENERGY_COUNTER_BITS,
    )],
);

/// | Bits   | Field               | Description                 |
/// |--------|---------------------|-----------------------------|
/// | 0-14   | thermal_spec_power  | TDP in power units          |
/// | 16-30  | minimum_power       | in power units              |
/// | 32-46  | maximum_power       | in power units              |
/// | 48-53  | maximum_time_window | in time units               |
pub const PKG_POWER_INFO: RegisterLayout = RegisterLayout::new(
    "MSR_PKG_POWER_INFO",
    msr::MSR_PKG_POWER_INFO,
    &[
        FieldSpec::new(THERMAL_SPEC_POWER, 0, 15),
        FieldSpec::new(MINIMUM_POWER, 16, 15),
        FieldSpec::new(MAXIMUM_POWER, 32, 15),
        FieldSpec::new(MAXIMUM_TIME_WINDOW, 48, 6),
    ],
);
