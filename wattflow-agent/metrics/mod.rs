pub mod accountant;
pub mod delta;
pub mod types;

pub use accountant::{average_power, EnergySnapshot, EnergySource, IntervalAccountant};
pub use delta::{energy_delta, node_delta};
pub use types::{IntervalResult, MeterReport, SampleStatus, Source, SourceReport};
