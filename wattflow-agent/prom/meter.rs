use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Result;
use crate::metrics::{MeterReport, Source};

labeled_enum! {
    pub enum MeterMetric {
        Power => "wattflow_power_watts",
        IntervalEnergy => "wattflow_interval_energy_joules",
        TotalEnergy => "wattflow_energy_joules_total",
        Degraded => "wattflow_sample_degraded",
    }
}

impl MeterMetric {
    fn help(&self) -> &'static str {
        match self {
            MeterMetric::Power => "Average power over the last sampling interval",
            MeterMetric::IntervalEnergy => "Energy consumed during the last sampling interval",
            MeterMetric::TotalEnergy => "Energy consumed since monitoring started",
            MeterMetric::Degraded => "1 when the last sample for this source failed",
        }
    }
}

/// Publishes meter reports as Prometheus gauges labelled by source
pub struct MeterMetricExporter {
    registry: Arc<Registry>,
    gauges: HashMap<MeterMetric, HashMap<Source, Gauge>>,
}

impl MeterMetricExporter {
    pub fn new(sources: &[Source]) -> Result<Self> {
        let mut exporter = Self {
            registry: Arc::new(Registry::new()),
            gauges: HashMap::new(),
        };

        exporter.register_metrics(sources)?;

        Ok(exporter)
    }

    fn register_metrics(&mut self, sources: &[Source]) -> Result<()> {
        for metric in MeterMetric::ALL {
            let opts = prometheus::Opts::new(metric.label(), metric.help());

            let mut source_map = HashMap::new();
            for &source in sources {
                let gauge = Gauge::with_opts(opts.clone().const_label("source", source.label()))?;
                self.registry.register(Box::new(gauge.clone()))?;
                source_map.insert(source, gauge);
            }
            self.gauges.insert(*metric, source_map);
        }

        Ok(())
    }

    fn set(&self, metric: MeterMetric, source: Source, value: f64) {
        if let Some(gauge) = self.gauges.get(&metric).and_then(|m| m.get(&source)) {
            gauge.set(value);
        }
    }

    pub fn update(&self, report: &MeterReport) {
        for entry in &report.sources {
            let degraded = !entry.status.is_ok();
            self.set(MeterMetric::Power, entry.source, entry.result.power);
            self.set(MeterMetric::IntervalEnergy, entry.source, entry.result.energy);
            self.set(MeterMetric::TotalEnergy, entry.source, entry.result.total_energy);
            self.set(MeterMetric::Degraded, entry.source, f64::from(u8::from(degraded)));
        }
    }

    /// Apply every report published on `reports` until the meter goes away
    pub async fn follow(self: Arc<Self>, mut reports: watch::Receiver<MeterReport>) {
        while reports.changed().await.is_ok() {
            let report = reports.borrow_and_update().clone();
            self.update(&report);
        }
        tracing::debug!("Report channel closed, exporter stops following");
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Current gauges in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[cfg(test)]
    fn value(&self, metric: MeterMetric, source: Source) -> Option<f64> {
        self.gauges
            .get(&metric)
            .and_then(|m| m.get(&source))
            .map(Gauge::get)
    }
}
