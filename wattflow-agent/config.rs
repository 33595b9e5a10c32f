use std::time::Duration;

use crate::error::{MeterError, Result};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Which sources the sampling loop tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
    /// RAPL package domain, summed over all nodes
    pub package: bool,
    /// RAPL cores (PP0) domain, summed over all nodes
    pub cores: bool,
    /// Accelerator device index, if any
    pub accelerator: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            package: true,
            cores: false,
            accelerator: None,
        }
    }
}

impl SourceConfig {
    pub fn is_empty(&self) -> bool {
        !self.package && !self.cores && self.accelerator.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct MeterConfig {
    pub interval: Duration,
    pub sources: SourceConfig,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            sources: SourceConfig::default(),
        }
    }
}

impl MeterConfig {
    pub fn new(interval_ms: u64, sources: SourceConfig) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            sources,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(MeterError::Config(
                "sampling interval must be at least 1 ms".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(MeterError::Config(
                "no measurement source enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MeterConfig::default();
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert!(config.sources.package);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MeterConfig::new(0, SourceConfig::default());
        assert!(matches!(config.validate(), Err(MeterError::Config(_))));
    }

    #[test]
    fn test_empty_source_set_rejected() {
        let sources = SourceConfig {
            package: false,
            cores: false,
            accelerator: None,
        };
        assert!(sources.is_empty());
        assert!(MeterConfig::new(100, sources).validate().is_err());
    }

    #[test]
    fn test_accelerator_only_is_valid() {
        let sources = SourceConfig {
            package: false,
            cores: false,
            accelerator: Some(0),
        };
        assert!(MeterConfig::new(100, sources).validate().is_ok());
    }
}
