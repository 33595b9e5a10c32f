use std::fs;
use std::path::Path;

use crate::error::{MeterError, Result};

/// Upper bound on aggregation nodes tracked by one meter
pub const MAX_NODES: usize = 8;

const NODE_ROOT: &str = "/sys/devices/system/node";

/// Machine topology as seen by the meter: one representative core per node
///
/// Each NUMA node is assumed to hold one CPU package with its own RAPL
/// registers, addressed through the first core of the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    node_cores: Vec<u32>,
}

impl Topology {
    pub fn new(node_cores: Vec<u32>) -> Result<Self> {
        if node_cores.is_empty() {
            return Err(MeterError::InvalidArgument(
                "topology needs at least one node".to_string(),
            ));
        }
        if node_cores.len() > MAX_NODES {
            return Err(MeterError::InvalidArgument(format!(
                "topology has {} nodes, at most {MAX_NODES} are supported",
                node_cores.len()
            )));
        }
        Ok(Self { node_cores })
    }

    /// Single node addressed through core 0
    pub fn single() -> Self {
        Self { node_cores: vec![0] }
    }

    /// Detect NUMA nodes from sysfs
    pub fn detect() -> Result<Self> {
        let root = Path::new(NODE_ROOT);
        if !root.exists() {
            tracing::warn!("{NODE_ROOT} not found, assuming a single node on core 0");
            return Ok(Self::single());
        }
        Self::detect_from(root)
    }

    /// Detect from a sysfs-shaped directory containing `online` and `node<N>/cpulist`
    pub fn detect_from(root: &Path) -> Result<Self> {
        let online = read_trimmed(&root.join("online"))?;
        let nodes = parse_cpu_list(&online).ok_or_else(|| {
            MeterError::Topology(format!("unparsable node list {online:?}"))
        })?;

        let mut node_cores = Vec::with_capacity(nodes.len());
        for node in nodes {
            let path = root.join(format!("node{node}")).join("cpulist");
            let cpulist = read_trimmed(&path)?;
            // Memory-only nodes (CXL, HBM) list no CPUs and have no RAPL package
            if cpulist.is_empty() {
                tracing::debug!("Node {node} has no CPUs, skipping");
                continue;
            }
            let first = parse_cpu_list(&cpulist)
                .and_then(|cpus| cpus.first().copied())
                .ok_or_else(|| {
                    MeterError::Topology(format!(
                        "node {node} has no usable cpulist ({cpulist:?})"
                    ))
                })?;
            tracing::debug!("Node {node} addressed through core {first}");
            node_cores.push(first);
        }

        if node_cores.is_empty() {
            return Err(MeterError::Topology(format!(
                "no online node under {} has CPUs",
                root.display()
            )));
        }

        let topology = Self::new(node_cores)?;
        tracing::info!(
            "Detected {} node(s), representative cores {:?}",
            topology.node_count(),
            topology.node_cores
        );
        Ok(topology)
    }

    pub fn node_count(&self) -> usize {
        self.node_cores.len()
    }

    /// Representative core of `node`
    pub fn core_for_node(&self, node: usize) -> Result<u32> {
        self.node_cores.get(node).copied().ok_or_else(|| {
            MeterError::InvalidArgument(format!(
                "node {node} out of range (topology has {} nodes)",
                self.node_cores.len()
            ))
        })
    }

    pub fn node_cores(&self) -> &[u32] {
        &self.node_cores
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| MeterError::Topology(format!("failed to read {}: {e}", path.display())))
}

/// Parse a kernel cpu list like "0-3,8-11" into its members
pub fn parse_cpu_list(s: &str) -> Option<Vec<u32>> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().ok()?;
            let end: u32 = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse().ok()?);
        }
    }
    if cpus.is_empty() {
        None
    } else {
        Some(cpus)
    }
}
