use anyhow::Context;
use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use wattflow::{
    counters::NvmlDriver, AcceleratorDriver, CalibrationFactors, DomainReader, MeterBackends,
    MeterConfig, MeterMetricExporter, MsrDevice, PowerMeter, RegisterReader, Source, SourceConfig,
    Topology,
};
use wattflow_raw::MsrFile;

#[derive(Parser, Debug)]
#[command(name = "wattflow")]
#[command(about = "RAPL and NVML energy meter with a Prometheus endpoint")]
struct Args {
    #[arg(
        long,
        default_value_t = wattflow::config::DEFAULT_INTERVAL_MS,
        help = "Sampling interval in milliseconds"
    )]
    interval_ms: u64,

    #[arg(long, help = "Track the RAPL cores (PP0) domain")]
    cores: bool,

    #[arg(long, help = "Do not track the RAPL package domain")]
    no_package: bool,

    #[arg(long = "gpu", value_name = "DEVICE", help = "Track the NVML device with this index")]
    gpu: Option<u32>,

    #[arg(
        long = "node-core",
        help = "Core to read for each NUMA node, in node order (supports ranges and comma-separated lists: --node-core 0,16 or --node-core 0 --node-core 16)",
        action = clap::ArgAction::Append
    )]
    node_cores: Vec<String>,

    #[arg(long, default_value_t = 8080, help = "Port serving /metrics")]
    port: u16,

    #[arg(short, long, help = "Enable verbose logging (shows every MSR read and tick)")]
    verbose: bool,
}

async fn metrics_handler(
    axum::extract::State(exporter): axum::extract::State<Arc<MeterMetricExporter>>,
) -> impl IntoResponse {
    let body = exporter.gather_text().unwrap_or_else(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        String::new()
    });

    let content_type = TextEncoder::new().format_type().to_string();
    ([("Content-Type", content_type)], body)
}

fn check_permissions() -> anyhow::Result<()> {
    let msr_path = "/dev/cpu/0/msr";
    if let Err(e) = MsrFile::open(0) {
        if e.is_permission_denied() {
            anyhow::bail!("permission denied accessing {msr_path}; run as root or grant CAP_SYS_RAWIO");
        }
        anyhow::bail!("cannot access {msr_path} ({e}); the msr kernel module may not be loaded (run: sudo modprobe msr)");
    }

    Ok(())
}

/// Parse a list of range strings like ["0-3", "5", "8-11"] in the order given
/// Supports multiple formats:
/// - Single values: "0", "16"
/// - Ranges: "0-3" (inclusive)
/// - Comma-separated: "0,16"
/// - Mixed: "0-1,16"
fn parse_range_list(inputs: &[String]) -> anyhow::Result<Vec<u32>> {
    let mut result = Vec::new();

    for input in inputs {
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start_str, end_str)) = part.split_once('-') {
                let start = start_str
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("invalid range start in '{part}'"))?;
                let end = end_str
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("invalid range end in '{part}'"))?;
                result.extend(start..=end);
            } else {
                let val = part
                    .parse::<u32>()
                    .with_context(|| format!("invalid core id '{part}'"))?;
                result.push(val);
            }
        }
    }

    Ok(result)
}

fn build_topology(node_cores: &[String]) -> anyhow::Result<Topology> {
    if node_cores.is_empty() {
        return Topology::detect().context("failed to detect NUMA topology");
    }

    let cores = parse_range_list(node_cores)?;
    Topology::new(cores).context("invalid --node-core list")
}

/// Log the advertised TDP using the units the meter calibrated at launch
fn log_processor_tdp(
    registers: Arc<dyn RegisterReader>,
    topology: &Topology,
    calibration: CalibrationFactors,
) {
    let reader = DomainReader::new(registers, topology.clone(), calibration);
    match reader.read_processor_tdp() {
        Ok(tdp) => tracing::info!("Processor TDP: {:.1} W", tdp),
        Err(e) => tracing::warn!("Could not read processor TDP: {}", e),
    }
}

async fn shutdown_signal() {
    tracing::info!("Installing signal handlers...");

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::warn!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::warn!("Shutdown triggered by SIGTERM");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let sources = SourceConfig {
        package: !args.no_package,
        cores: args.cores,
        accelerator: args.gpu,
    };
    let rapl_enabled = sources.package || sources.cores;

    if rapl_enabled {
        check_permissions()?;
    }

    let topology = build_topology(&args.node_cores)?;
    tracing::info!(
        "Monitoring {} NUMA node(s) through cores {:?}",
        topology.node_count(),
        topology.node_cores()
    );

    let registers: Arc<dyn RegisterReader> = Arc::new(MsrDevice::new());

    let accelerator = args
        .gpu
        .map(|_| Arc::new(NvmlDriver::new()) as Arc<dyn AcceleratorDriver>);

    let config = MeterConfig::new(args.interval_ms, sources);
    let backends = MeterBackends {
        registers: Arc::clone(&registers),
        topology,
        accelerator,
    };
    let meter =
        PowerMeter::start_monitoring(config, backends).context("failed to start power meter")?;

    if let Some(calibration) = meter.calibration() {
        log_processor_tdp(registers, meter.topology(), *calibration);
    }

    let tracked: Vec<Source> = meter.latest().sources.iter().map(|r| r.source).collect();
    let exporter = Arc::new(MeterMetricExporter::new(&tracked)?);
    let follower = tokio::spawn(Arc::clone(&exporter).follow(meter.subscribe()));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(exporter);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::warn!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete, stopping the sampling loop...");

    let outcome = meter.stop_monitoring().await;
    if let Err(e) = follower.await {
        tracing::warn!("Exporter task ended abnormally: {}", e);
    }
    outcome.context("sampling loop terminated with an error")?;

    tracing::info!("All tasks completed, exiting");

    Ok(())
}
