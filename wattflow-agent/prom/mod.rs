pub mod meter;

pub use meter::{MeterMetric, MeterMetricExporter};
