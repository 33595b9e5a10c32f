use std::io;
use thiserror::Error;

use crate::counters::rapl::Domain;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Hardware access failed: {0}")]
    HardwareAccess(#[from] wattflow_raw::MsrError),

    #[error("Unsupported RAPL domain: {0}")]
    UnsupportedDomain(Domain),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate sampling interval ({elapsed:.9}s)")]
    DegenerateInterval { elapsed: f64 },

    #[error("Accelerator driver error: {0}")]
    Accelerator(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sampling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl MeterError {
    /// Errors after which sampling cannot meaningfully continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, MeterError::HardwareAccess(_))
    }
}

impl From<nvml_wrapper::error::NvmlError> for MeterError {
    fn from(e: nvml_wrapper::error::NvmlError) -> Self {
        MeterError::Accelerator(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MeterError>;
