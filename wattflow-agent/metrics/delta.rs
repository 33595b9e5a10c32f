//! Wraparound-corrected energy differences
//!
//! Hardware energy counters are cumulative and wrap to zero on overflow. A
//! negative per-node difference therefore means the counter rolled over once
//! during the interval, and the counter's range (`wrap_modulus`, in joules)
//! is added back.
//!
//! Precondition: at most one wraparound per node between two snapshots. A
//! 32-bit RAPL package counter at 2^-14 J per LSB wraps after ~262 kJ, which
//! is roughly an hour at 70 W but only minutes on large servers; sampling
//! intervals must stay well below that. Double wraparound is not detectable.

/// Energy consumed by one node between two cumulative readings
#[inline]
pub fn node_delta(current: f64, previous: f64, wrap_modulus: f64) -> f64 {
    let diff = current - previous;
    if diff < 0.0 {
        diff + wrap_modulus
    } else {
        diff
    }
}

/// Total energy consumed across nodes; `current` and `previous` are indexed 1:1 by node
pub fn energy_delta(current: &[f64], previous: &[f64], wrap_modulus: f64) -> f64 {
    debug_assert_eq!(
        current.len(),
        previous.len(),
        "snapshots cover different node counts"
    );

    current
        .iter()
        .zip(previous)
        .map(|(&curr, &prev)| node_delta(curr, prev, wrap_modulus))
        .sum()
}
