labeled_enum! {
    /// A tracked measurement source
    pub enum Source {
        Package => "package",
        Cores => "cores",
        Accelerator => "accelerator",
    }
}

/// Outcome of the most recently completed interval for one source
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalResult {
    /// Average power over the interval, in watts
    pub power: f64,
    /// Energy consumed during the interval, in joules
    pub energy: f64,
    /// Energy consumed since tracking started, in joules
    pub total_energy: f64,
    /// The interval had no measurable duration and `power` was reported as 0
    pub degenerate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleStatus {
    Ok,
    /// The tick failed; `result` still holds the previous interval
    Degraded(String),
    /// The tick failed in a way that stopped the sampling loop
    Failed(String),
}

impl SampleStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SampleStatus::Ok)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: Source,
    pub result: IntervalResult,
    pub status: SampleStatus,
}

/// Results of one sampling tick across every tracked source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReport {
    /// Number of completed ticks, 0 before the first one
    pub sequence: u64,
    pub sources: Vec<SourceReport>,
}

impl MeterReport {
    pub fn get(&self, source: Source) -> Option<&SourceReport> {
        self.sources.iter().find(|report| report.source == source)
    }

    pub fn has_failure(&self) -> bool {
        self.sources
            .iter()
            .any(|report| matches!(report.status, SampleStatus::Failed(_)))
    }
}
