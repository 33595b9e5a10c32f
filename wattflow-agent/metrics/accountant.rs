use std::time::Instant;

use crate::common::MAX_NODES;
use crate::error::{MeterError, Result};
use crate::metrics::delta::energy_delta;
use crate::metrics::types::{IntervalResult, Source};

/// Intervals shorter than this are treated as having no duration
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// A cumulative energy counter, read per node and reported in joules
pub trait EnergySource: Send {
    fn source(&self) -> Source;

    /// Number of nodes filled by `read_energy`, in `1..=MAX_NODES`
    fn node_count(&self) -> usize;

    /// Joules at which one node's counter wraps back to zero
    fn wrap_modulus(&self) -> f64;

    /// Fill `out[i]` with node `i`'s cumulative reading; `out.len() == node_count()`
    fn read_energy(&mut self, out: &mut [f64]) -> Result<()>;
}

impl<T: EnergySource + ?Sized> EnergySource for Box<T> {
    fn source(&self) -> Source {
        (**self).source()
    }

    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn wrap_modulus(&self) -> f64 {
        (**self).wrap_modulus()
    }

    fn read_energy(&mut self, out: &mut [f64]) -> Result<()> {
        (**self).read_energy(out)
    }
}

/// Per-node cumulative energy at one point in time
#[derive(Debug, Clone, Copy)]
pub struct EnergySnapshot {
    pub time: Instant,
    energy: [f64; MAX_NODES],
    nodes: usize,
}

impl EnergySnapshot {
    fn new(nodes: usize) -> Self {
        Self {
            time: Instant::now(),
            energy: [0.0; MAX_NODES],
            nodes,
        }
    }

    pub fn energy(&self) -> &[f64] {
        &self.energy[..self.nodes]
    }

    fn energy_mut(&mut self) -> &mut [f64] {
        &mut self.energy[..self.nodes]
    }

    /// Sum over nodes, in joules
    pub fn total(&self) -> f64 {
        self.energy().iter().sum()
    }
}

/// Average power, or `DegenerateInterval` when `elapsed` has no usable duration
pub fn average_power(energy: f64, elapsed: f64) -> Result<f64> {
    if elapsed.is_nan() || elapsed < MIN_ELAPSED_SECS {
        return Err(MeterError::DegenerateInterval { elapsed });
    }
    Ok(energy / elapsed)
}

/// Interval and lifetime energy accounting for one source
///
/// Two snapshot slots are kept: `last` holds the start of the running
/// interval and `current` is overwritten by each tick, after which the slots
/// are swapped.
pub struct IntervalAccountant<S> {
    source: S,
    last: EnergySnapshot,
    current: EnergySnapshot,
    result: IntervalResult,
    started: bool,
}

impl<S: EnergySource> IntervalAccountant<S> {
    pub fn new(source: S) -> Result<Self> {
        let nodes = source.node_count();
        if nodes == 0 || nodes > MAX_NODES {
            return Err(MeterError::InvalidArgument(format!(
                "{} source reports {nodes} nodes, expected 1..={MAX_NODES}",
                source.source()
            )));
        }

        Ok(Self {
            source,
            last: EnergySnapshot::new(nodes),
            current: EnergySnapshot::new(nodes),
            result: IntervalResult::default(),
            started: false,
        })
    }

    /// Take the initial snapshot
    pub fn start(&mut self) -> Result<()> {
        self.source.read_energy(self.last.energy_mut())?;
        self.last.time = Instant::now();
        self.started = true;
        tracing::debug!(
            "{}: started at {:.6} J",
            self.source.source(),
            self.last.total()
        );
        Ok(())
    }

    /// Close the running interval and open the next one
    pub fn tick(&mut self) -> Result<IntervalResult> {
        self.ensure_started()?;
        self.source.read_energy(self.current.energy_mut())?;
        let now = Instant::now();
        Ok(self.close_interval(now))
    }

    /// Like [`tick`](Self::tick), stamping the new snapshot with `now`
    pub fn tick_at(&mut self, now: Instant) -> Result<IntervalResult> {
        self.ensure_started()?;
        self.source.read_energy(self.current.energy_mut())?;
        Ok(self.close_interval(now))
    }

    /// Like [`start`](Self::start), stamping the snapshot with `now`
    pub fn start_at(&mut self, now: Instant) -> Result<()> {
        self.start()?;
        self.last.time = now;
        Ok(())
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(MeterError::InvalidArgument(format!(
                "{} accountant ticked before start",
                self.source.source()
            )))
        }
    }

    fn close_interval(&mut self, now: Instant) -> IntervalResult {
        self.current.time = now;

        let energy = energy_delta(
            self.current.energy(),
            self.last.energy(),
            self.source.wrap_modulus(),
        );
        let elapsed = now.saturating_duration_since(self.last.time).as_secs_f64();

        let (power, degenerate) = match average_power(energy, elapsed) {
            Ok(power) => (power, false),
            Err(e) => {
                tracing::warn!("{}: {}, reporting zero power", self.source.source(), e);
                (0.0, true)
            }
        };

        self.result = IntervalResult {
            power,
            energy,
            total_energy: self.result.total_energy + energy,
            degenerate,
        };

        std::mem::swap(&mut self.last, &mut self.current);
        self.result
    }

    pub fn result(&self) -> IntervalResult {
        self.result
    }

    pub fn source(&self) -> Source {
        self.source.source()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Snapshot opening the running interval
    pub fn last_snapshot(&self) -> &EnergySnapshot {
        &self.last
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    pub(crate) const SCALE: f64 = 1.0 / 65536.0;
    pub(crate) const MODULUS: f64 = 4_294_967_296.0 * SCALE;

    /// Replays scripted raw counter values, one row per read; the last row repeats
    pub(crate) struct ScriptedSource {
        pub source: Source,
        pub nodes: usize,
        pub rows: VecDeque<Result<Vec<u64>>>,
    }

    impl ScriptedSource {
        pub fn new(source: Source, rows: Vec<Vec<u64>>) -> Self {
            let nodes = rows.first().map_or(1, Vec::len);
            Self {
                source,
                nodes,
                rows: rows.into_iter().map(Ok).collect(),
            }
        }
    }

    impl EnergySource for ScriptedSource {
        fn source(&self) -> Source {
            self.source
        }

        fn node_count(&self) -> usize {
            self.nodes
        }

        fn wrap_modulus(&self) -> f64 {
            MODULUS
        }

        fn read_energy(&mut self, out: &mut [f64]) -> Result<()> {
            let held = match self.rows.front() {
                Some(Ok(row)) if self.rows.len() == 1 => Some(row.clone()),
                _ => None,
            };
            let row = match held {
                Some(row) => row,
                None => self
                    .rows
                    .pop_front()
                    .unwrap_or_else(|| Err(MeterError::InvalidArgument("script exhausted".into())))?,
            };
            for (slot, raw) in out.iter_mut().zip(row) {
                *slot = raw as f64 * SCALE;
            }
            Ok(())
        }
    }

    fn accountant(rows: Vec<Vec<u64>>) -> IntervalAccountant<ScriptedSource> {
        IntervalAccountant::new(ScriptedSource::new(Source::Package, rows)).unwrap()
    }

    #[test]
    fn test_one_second_interval() {
        let mut acc = accountant(vec![vec![1000], vec![5000]]);
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        let result = acc.tick_at(t0 + Duration::from_secs(1)).unwrap();
        let expected = 4000.0 * SCALE;
        assert_eq!(result.energy, expected);
        assert!((result.power - expected).abs() < 1e-12);
        assert!((result.energy - 0.0610).abs() < 1e-4);
        assert_eq!(result.total_energy, expected);
        assert!(!result.degenerate);
    }

    #[test]
    fn test_wraparound_interval() {
        let mut acc = accountant(vec![vec![4_294_967_290], vec![10]]);
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        let result = acc.tick_at(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(result.energy, 16.0 * SCALE);
        assert!((result.power - 32.0 * SCALE).abs() < 1e-12);
    }

    #[test]
    fn test_same_timestamp_reports_zero_power() {
        let mut acc = accountant(vec![vec![100], vec![300]]);
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        let result = acc.tick_at(t0).unwrap();
        assert_eq!(result.power, 0.0);
        assert!(result.power.is_finite());
        assert!(result.degenerate);
        assert_eq!(result.energy, 200.0 * SCALE);
    }

    #[test]
    fn test_clock_going_backwards_is_degenerate() {
        let mut acc = accountant(vec![vec![100], vec![300]]);
        let t0 = Instant::now() + Duration::from_secs(5);
        acc.start_at(t0).unwrap();

        let result = acc.tick_at(t0 - Duration::from_secs(1)).unwrap();
        assert_eq!(result.power, 0.0);
        assert!(result.degenerate);
    }

    #[test]
    fn test_lifetime_total_is_monotonic() {
        let rows = vec![
            vec![0, 4_294_967_000],
            vec![1_000, 4_294_967_200],
            vec![1_000, 50],
            vec![70_000, 900],
            vec![4_294_967_295, 901],
            vec![3, 2_000],
        ];
        let mut acc = accountant(rows);
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        let mut previous_total = 0.0;
        let mut summed = 0.0;
        for i in 1..=5 {
            let result = acc.tick_at(t0 + Duration::from_millis(100 * i)).unwrap();
            assert!(result.energy >= 0.0);
            assert!(result.power >= 0.0);
            assert!(result.total_energy >= previous_total);
            previous_total = result.total_energy;
            summed += result.energy;
        }
        assert!((acc.result().total_energy - summed).abs() < 1e-9);
    }

    #[test]
    fn test_tick_before_start_is_rejected() {
        let mut acc = accountant(vec![vec![1], vec![2]]);
        assert!(matches!(acc.tick(), Err(MeterError::InvalidArgument(_))));
        assert!(!acc.is_started());
    }

    #[test]
    fn test_failed_read_keeps_interval_open() {
        let mut source = ScriptedSource::new(Source::Cores, vec![vec![1000]]);
        source
            .rows
            .push_back(Err(MeterError::Accelerator("transient".into())));
        source.rows.push_back(Ok(vec![3000]));

        let mut acc = IntervalAccountant::new(source).unwrap();
        let t0 = Instant::now();
        acc.start_at(t0).unwrap();

        assert!(acc.tick_at(t0 + Duration::from_secs(1)).is_err());
        assert_eq!(acc.last_snapshot().energy(), &[1000.0 * SCALE]);

        let result = acc.tick_at(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(result.energy, 2000.0 * SCALE);
        assert!((result.power - 1000.0 * SCALE).abs() < 1e-12);
    }

    #[test]
    fn test_node_count_is_bounded() {
        let too_wide = ScriptedSource::new(Source::Package, vec![vec![0; MAX_NODES + 1]]);
        assert!(IntervalAccountant::new(too_wide).is_err());
    }

    #[test]
    fn test_average_power_guard() {
        assert!(matches!(
            average_power(1.0, 0.0),
            Err(MeterError::DegenerateInterval { .. })
        ));
        assert!(average_power(1.0, f64::NAN).is_err());
        assert_eq!(average_power(3.0, 2.0).unwrap(), 1.5);
    }
}
