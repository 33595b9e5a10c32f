//! Background sampling loop driving every tracked source at a fixed cadence

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::common::{RegisterReader, Topology};
use crate::config::MeterConfig;
use crate::counters::{
    AcceleratorDriver, AcceleratorSource, CalibrationFactors, Domain, DomainReader, RaplSource,
};
use crate::error::{MeterError, Result};
use crate::metrics::{
    EnergySource, IntervalAccountant, IntervalResult, MeterReport, SampleStatus, Source,
    SourceReport,
};

type Tracked = IntervalAccountant<Box<dyn EnergySource>>;

/// External capabilities the meter measures through
pub struct MeterBackends {
    pub registers: Arc<dyn RegisterReader>,
    pub topology: Topology,
    pub accelerator: Option<Arc<dyn AcceleratorDriver>>,
}

/// A running sampling loop and the latest results it published
///
/// Created by [`PowerMeter::start_monitoring`] and consumed by
/// [`PowerMeter::stop_monitoring`], so launches and stops always pair up.
pub struct PowerMeter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
    reports: watch::Receiver<MeterReport>,
    accelerator: Option<Arc<dyn AcceleratorDriver>>,
    calibration: Option<CalibrationFactors>,
    topology: Topology,
    interval: Duration,
}

impl PowerMeter {
    /// Calibrate, take initial snapshots and spawn the sampling task
    ///
    /// Must be called from within a tokio runtime. Any initialization failure
    /// aborts the launch; an accelerator runtime brought up along the way is
    /// shut down again.
    pub fn start_monitoring(config: MeterConfig, backends: MeterBackends) -> Result<Self> {
        config.validate()?;

        let MeterBackends {
            registers,
            topology,
            accelerator,
        } = backends;
        let sources = config.sources;

        let mut accountants: Vec<Tracked> = Vec::new();
        let mut calibration = None;

        if sources.package || sources.cores {
            let core = topology.core_for_node(0)?;
            let factors = CalibrationFactors::compute(registers.as_ref(), core)?;
            calibration = Some(factors);

            let reader = Arc::new(DomainReader::new(registers, topology.clone(), factors));
            if sources.package {
                accountants.push(rapl_accountant(&reader, Domain::Package)?);
            }
            if sources.cores {
                accountants.push(rapl_accountant(&reader, Domain::Cores)?);
            }
        }

        let driver = match sources.accelerator {
            Some(device_id) => {
                let driver = accelerator.ok_or_else(|| {
                    MeterError::Config(
                        "accelerator source enabled without an accelerator driver".to_string(),
                    )
                })?;
                let source: Box<dyn EnergySource> =
                    Box::new(AcceleratorSource::new(Arc::clone(&driver), device_id));
                accountants.push(IntervalAccountant::new(source)?);
                driver.init()?;
                Some(driver)
            }
            None => None,
        };

        for accountant in &mut accountants {
            if let Err(e) = accountant.start() {
                tracing::error!("Failed to start {} source: {}", accountant.source(), e);
                if let Some(driver) = &driver {
                    if let Err(shutdown_err) = driver.shutdown() {
                        tracing::warn!("Accelerator shutdown after failed launch: {}", shutdown_err);
                    }
                }
                return Err(e);
            }
        }

        Ok(Self::spawn(
            accountants,
            config.interval,
            driver,
            calibration,
            topology,
        ))
    }

    fn spawn(
        accountants: Vec<Tracked>,
        interval: Duration,
        accelerator: Option<Arc<dyn AcceleratorDriver>>,
        calibration: Option<CalibrationFactors>,
        topology: Topology,
    ) -> Self {
        let initial = MeterReport {
            sequence: 0,
            sources: accountants.iter().map(report_for_ok).collect(),
        };
        let (sender, reports) = watch::channel(initial);
        let stop = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(sampling_loop(
            accountants,
            interval,
            Arc::clone(&stop),
            sender,
        ));

        Self {
            stop,
            handle: Some(handle),
            reports,
            accelerator,
            calibration,
            topology,
            interval,
        }
    }

    /// Signal the loop, wait for it to finish and release the accelerator runtime
    ///
    /// Returns the error that terminated the loop early, if any.
    pub async fn stop_monitoring(mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);

        let outcome = match self.handle.take() {
            Some(handle) => handle.await.map_err(MeterError::from).and_then(|r| r),
            None => Ok(()),
        };

        if let Some(driver) = self.accelerator.take() {
            if let Err(e) = driver.shutdown() {
                tracing::error!("Accelerator shutdown failed: {}", e);
                if outcome.is_ok() {
                    return Err(e);
                }
            }
        }

        tracing::info!("Power meter stopped");
        outcome
    }

    /// Copy of the most recently published report
    pub fn latest(&self) -> MeterReport {
        self.reports.borrow().clone()
    }

    pub fn latest_for(&self, source: Source) -> Option<IntervalResult> {
        self.reports.borrow().get(source).map(|report| report.result)
    }

    /// Receiver notified on every published report
    pub fn subscribe(&self) -> watch::Receiver<MeterReport> {
        self.reports.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// RAPL units, when a RAPL source is tracked
    pub fn calibration(&self) -> Option<&CalibrationFactors> {
        self.calibration.as_ref()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for PowerMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerMeter")
            .field("running", &self.is_running())
            .field("sequence", &self.reports.borrow().sequence)
            .field("accelerator", &self.accelerator.is_some())
            .field("calibration", &self.calibration)
            .field("topology", &self.topology)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Drop for PowerMeter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("PowerMeter dropped without stop_monitoring, signalling the loop");
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

fn rapl_accountant(reader: &Arc<DomainReader>, domain: Domain) -> Result<Tracked> {
    let source: Box<dyn EnergySource> = Box::new(RaplSource::new(Arc::clone(reader), domain)?);
    IntervalAccountant::new(source)
}

fn report_for_ok(accountant: &Tracked) -> SourceReport {
    SourceReport {
        source: accountant.source(),
        result: accountant.result(),
        status: SampleStatus::Ok,
    }
}

async fn sampling_loop(
    mut accountants: Vec<Tracked>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    reports: watch::Sender<MeterReport>,
) -> Result<()> {
    tracing::info!(
        "Sampling {} source(s) every {} ms",
        accountants.len(),
        interval.as_millis()
    );

    let mut sequence = 0u64;

    while !stop.load(Ordering::Relaxed) {
        tokio::time::sleep(interval).await;
        sequence += 1;

        let mut fatal = None;
        let mut sources = Vec::with_capacity(accountants.len());

        for accountant in &mut accountants {
            let source = accountant.source();
            let status = match accountant.tick() {
                Ok(result) => {
                    tracing::debug!(
                        "{}: power {:.3} W, energy {:.3} J, total {:.3} J",
                        source,
                        result.power,
                        result.energy,
                        result.total_energy
                    );
                    SampleStatus::Ok
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("{}: {}", source, e);
                    let status = SampleStatus::Failed(e.to_string());
                    fatal.get_or_insert(e);
                    status
                }
                Err(e) => {
                    tracing::warn!("{}: tick failed, keeping previous result: {}", source, e);
                    SampleStatus::Degraded(e.to_string())
                }
            };

            sources.push(SourceReport {
                source,
                result: accountant.result(),
                status,
            });
        }

        reports.send_replace(MeterReport { sequence, sources });

        if let Some(e) = fatal {
            tracing::error!("Sampling loop terminated after {} ticks", sequence);
            return Err(e);
        }
    }

    tracing::info!("Sampling loop stopped after {} ticks", sequence);
    Ok(())
}
