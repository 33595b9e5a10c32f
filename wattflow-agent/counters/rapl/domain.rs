use std::sync::Arc;

use wattflow_raw::rapl::{
    PKG_ENERGY_STATUS, PKG_POWER_INFO, PP0_ENERGY_STATUS, THERMAL_SPEC_POWER,
    TOTAL_ENERGY_CONSUMED,
};
use wattflow_raw::RegisterLayout;

use crate::common::{RegisterReader, Topology};
use crate::counters::rapl::CalibrationFactors;
use crate::error::{MeterError, Result};
use crate::metrics::{EnergySource, Source};

labeled_enum! {
    /// RAPL power domain
    pub enum Domain {
        Package => "package",
        Cores => "cores",
        Uncore => "uncore",
        Dram => "dram",
    }
}

impl Domain {
    pub fn code(&self) -> u32 {
        match self {
            Domain::Package => 0,
            Domain::Cores => 1,
            Domain::Uncore => 2,
            Domain::Dram => 3,
        }
    }

    /// Energy status register with an implemented decode path
    pub fn energy_layout(&self) -> Result<&'static RegisterLayout> {
        match self {
            Domain::Package => Ok(&PKG_ENERGY_STATUS),
            Domain::Cores => Ok(&PP0_ENERGY_STATUS),
            Domain::Uncore | Domain::Dram => Err(MeterError::UnsupportedDomain(*self)),
        }
    }
}

impl TryFrom<u32> for Domain {
    type Error = MeterError;

    fn try_from(code: u32) -> Result<Self> {
        Domain::ALL
            .iter()
            .copied()
            .find(|domain| domain.code() == code)
            .ok_or_else(|| {
                MeterError::InvalidArgument(format!(
                    "bad RAPL domain code {code}, supported codes are 0-3"
                ))
            })
    }
}

/// Reads calibrated RAPL energy counters on every topology node
pub struct DomainReader {
    registers: Arc<dyn RegisterReader>,
    topology: Topology,
    calibration: CalibrationFactors,
}

impl DomainReader {
    pub fn new(
        registers: Arc<dyn RegisterReader>,
        topology: Topology,
        calibration: CalibrationFactors,
    ) -> Self {
        Self {
            registers,
            topology,
            calibration,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn calibration(&self) -> &CalibrationFactors {
        &self.calibration
    }

    fn read_field(&self, node: usize, layout: &RegisterLayout, field: &str) -> Result<u64> {
        let core = self.topology.core_for_node(node)?;
        let raw = self.registers.read_raw_register(core, layout.address)?;
        // Layout tables are static, a missing field is a table bug
        debug_assert!(layout.spec(field).is_some(), "{} has no field {field}", layout.name);
        Ok(layout.field(raw, field).unwrap_or_default())
    }

    /// Cumulative energy of `domain` on one node, in joules
    pub fn read_node_energy(&self, node: usize, domain: Domain) -> Result<f64> {
        let layout = domain.energy_layout()?;
        let counter = self.read_field(node, layout, TOTAL_ENERGY_CONSUMED)?;
        tracing::trace!("{} counter on node {}: {}", domain, node, counter);
        Ok(counter as f64 * self.calibration.energy_scale)
    }

    /// Cumulative energy of `domain` summed over all nodes, in joules
    pub fn read_domain_energy(&self, domain: Domain) -> Result<f64> {
        let mut total = 0.0;
        for node in 0..self.topology.node_count() {
            total += self.read_node_energy(node, domain)?;
        }
        Ok(total)
    }

    /// Thermal design power summed over all nodes, in watts
    pub fn read_processor_tdp(&self) -> Result<f64> {
        let mut total = 0u64;
        for node in 0..self.topology.node_count() {
            total += self.read_field(node, &PKG_POWER_INFO, THERMAL_SPEC_POWER)?;
        }
        Ok(total as f64 * self.calibration.power_scale)
    }
}

/// One RAPL domain across all nodes, as an accountant source
pub struct RaplSource {
    reader: Arc<DomainReader>,
    domain: Domain,
    source: Source,
}

impl RaplSource {
    pub fn new(reader: Arc<DomainReader>, domain: Domain) -> Result<Self> {
        let source = match domain {
            Domain::Package => Source::Package,
            Domain::Cores => Source::Cores,
            Domain::Uncore | Domain::Dram => return Err(MeterError::UnsupportedDomain(domain)),
        };
        Ok(Self {
            reader,
            domain,
            source,
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }
}

impl EnergySource for RaplSource {
    fn source(&self) -> Source {
        self.source
    }

    fn node_count(&self) -> usize {
        self.reader.topology().node_count()
    }

    fn wrap_modulus(&self) -> f64 {
        self.reader.calibration().energy_wrap_modulus
    }

    fn read_energy(&mut self, out: &mut [f64]) -> Result<()> {
        for (node, slot) in out.iter_mut().enumerate() {
            *slot = self.reader.read_node_energy(node, self.domain)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::rapl::calibration::tests::FakeRegisters;
    use crate::metrics::IntervalAccountant;
    use std::time::{Duration, Instant};
    use wattflow_raw::rapl::msr;

    const SCALE: f64 = 1.0 / 65536.0;

    fn two_node_reader() -> (Arc<FakeRegisters>, DomainReader) {
        let regs = Arc::new(FakeRegisters::default());
        let topology = Topology::new(vec![0, 16]).unwrap();
        let calibration = CalibrationFactors::from_exponents(3, 16, 10);
        let registers: Arc<dyn RegisterReader> = regs.clone();
        (regs, DomainReader::new(registers, topology, calibration))
    }

    #[test]
    fn test_domain_codes() {
        assert_eq!(Domain::try_from(0).unwrap(), Domain::Package);
        assert_eq!(Domain::try_from(3).unwrap(), Domain::Dram);
        assert!(matches!(
            Domain::try_from(4),
            Err(MeterError::InvalidArgument(_))
        ));
        for domain in Domain::ALL {
            assert_eq!(Domain::try_from(domain.code()).unwrap(), *domain);
        }
    }

    #[test]
    fn test_node_energy_uses_representative_core() {
        let (regs, reader) = two_node_reader();
        regs.set(0, msr::MSR_PKG_ENERGY_STATUS, 1000);
        regs.set(16, msr::MSR_PKG_ENERGY_STATUS, 3000 | (0xABCD << 32));
        regs.set(16, msr::MSR_PP0_ENERGY_STATUS, 500);

        assert_eq!(reader.read_node_energy(0, Domain::Package).unwrap(), 1000.0 * SCALE);
        assert_eq!(reader.read_node_energy(1, Domain::Package).unwrap(), 3000.0 * SCALE);
        assert_eq!(reader.read_node_energy(1, Domain::Cores).unwrap(), 500.0 * SCALE);
        assert_eq!(
            reader.read_domain_energy(Domain::Package).unwrap(),
            4000.0 * SCALE
        );
    }

    #[test]
    fn test_unimplemented_domains_are_errors_not_zero() {
        let (_regs, reader) = two_node_reader();
        for domain in [Domain::Uncore, Domain::Dram] {
            assert!(matches!(
                reader.read_node_energy(0, domain),
                Err(MeterError::UnsupportedDomain(d)) if d == domain
            ));
            assert!(reader.read_domain_energy(domain).is_err());
        }
    }

    #[test]
    fn test_node_out_of_range() {
        let (_regs, reader) = two_node_reader();
        assert!(matches!(
            reader.read_node_energy(2, Domain::Package),
            Err(MeterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_processor_tdp() {
        let (regs, reader) = two_node_reader();
        // 0x2D0 = 720 units of 1/8 W = 90 W per socket
        regs.set(0, msr::MSR_PKG_POWER_INFO, (0x0200u64 << 32) | 0x2D0);
        regs.set(16, msr::MSR_PKG_POWER_INFO, 0x2D0);
        assert_eq!(reader.read_processor_tdp().unwrap(), 180.0);
    }

    #[test]
    fn test_rapl_source_rejects_unsupported_domain() {
        let (_regs, reader) = two_node_reader();
        let reader = Arc::new(reader);
        assert!(RaplSource::new(Arc::clone(&reader), Domain::Dram).is_err());
        let source = RaplSource::new(reader, Domain::Cores).unwrap();
        assert_eq!(source.source(), Source::Cores);
        assert_eq!(source.node_count(), 2);
        assert_eq!(source.wrap_modulus(), 65536.0);
    }

    #[test]
    fn test_accounting_over_rapl_source_with_wrap() {
        let (regs, reader) = two_node_reader();
        regs.set(0, msr::MSR_PKG_ENERGY_STATUS, 4_294_967_290);
        regs.set(16, msr::MSR_PKG_ENERGY_STATUS, 1000);

        let source = RaplSource::new(Arc::new(reader), Domain::Package).unwrap();
        let mut acc = IntervalAccountant::new(source).unwrap();
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        regs.set(0, msr::MSR_PKG_ENERGY_STATUS, 10);
        regs.set(16, msr::MSR_PKG_ENERGY_STATUS, 5000);

        let result = acc.tick_at(t0 + Duration::from_secs(1)).unwrap();
        assert!((result.energy - 4016.0 * SCALE).abs() < 1e-12);
        assert!((result.power - 4016.0 * SCALE).abs() < 1e-12);
    }
}
