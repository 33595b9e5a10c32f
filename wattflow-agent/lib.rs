// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prom;

pub use common::{MsrDevice, RegisterReader, Topology};
pub use config::{MeterConfig, SourceConfig};
pub use counters::{AcceleratorDriver, CalibrationFactors, Domain, DomainReader, NvmlDriver};
pub use error::{MeterError, Result};
pub use metrics::{IntervalResult, MeterReport, SampleStatus, Source};
pub use orchestrator::{MeterBackends, PowerMeter};
pub use prom::MeterMetricExporter;
