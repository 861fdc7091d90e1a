//! Device cycle counter to host wall-clock conversion.
//!
//! Each run records one reference sample: a device cycle count taken at a
//! known host wall time, plus the counter frequency. Every other cycle count
//! is mapped linearly around that point:
//!
//! ```text
//! wall_ns = reference_wall_ns + (cycle - reference_cycle) * 1000 / cycles_per_us
//! ```
//!
//! The frequency is fractional (38.4 cycles/us is common), so it is held as a
//! whole number of cycles per second and the arithmetic is done in `i128`.
//! That keeps multi-day traces at multi-GHz rates exact and overflow free.
//!
//! Counter wraparound is not corrected. Results that land outside the run's
//! declared wall-time bounds are flagged as suspect instead.

use std::fmt;

use log::debug;

use crate::error::ConfigurationDefect;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// The per-run reference sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBaseReference {
    pub reference_cycle_count: u64,
    pub reference_wall_time_ns: i64,
    pub cycles_per_microsecond: f64,
}

/// Inclusive wall-clock window the run claims to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBounds {
    pub start_ns: i64,
    pub end_ns: i64,
}

impl RunBounds {
    pub fn contains(&self, wall_ns: i64) -> bool {
        wall_ns >= self.start_ns && wall_ns <= self.end_ns
    }
}

/// A converted timestamp that fell outside the run's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub cycle_count: u64,
    pub wall_time_ns: i64,
    pub bounds: RunBounds,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle {} maps to {} ns, outside run bounds [{}, {}]",
            self.cycle_count, self.wall_time_ns, self.bounds.start_ns, self.bounds.end_ns
        )
    }
}

/// Converts cycle counts for one run. Immutable and cheap to share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBaseReconciler {
    reference: TimeBaseReference,
    cycles_per_sec: i128,
    bounds: Option<RunBounds>,
}

impl TimeBaseReconciler {
    pub fn new(
        reference: TimeBaseReference,
        bounds: Option<RunBounds>,
    ) -> Result<Self, ConfigurationDefect> {
        let freq = reference.cycles_per_microsecond;
        if !freq.is_finite() || freq <= 0.0 {
            return Err(ConfigurationDefect::BadFrequency(freq));
        }
        let cycles_per_sec = (freq * 1_000_000.0).round() as i128;
        if cycles_per_sec <= 0 {
            return Err(ConfigurationDefect::BadFrequency(freq));
        }
        Ok(Self {
            reference,
            cycles_per_sec,
            bounds,
        })
    }

    pub fn reference(&self) -> &TimeBaseReference {
        &self.reference
    }

    pub fn bounds(&self) -> Option<RunBounds> {
        self.bounds
    }

    /// Convert a device cycle count to host epoch nanoseconds.
    ///
    /// Counts below the reference map to times before the reference; no
    /// wrap correction is attempted. Results beyond the `i64` range saturate.
    pub fn to_wall_time_ns(&self, cycle_count: u64) -> i64 {
        let delta = i128::from(cycle_count) - i128::from(self.reference.reference_cycle_count);
        let offset_ns = delta * NANOS_PER_SEC / self.cycles_per_sec;
        let wall = i128::from(self.reference.reference_wall_time_ns) + offset_ns;
        wall.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Convert a cycle delta (a duration) to nanoseconds.
    pub fn cycles_to_ns(&self, cycles: u64) -> i64 {
        let ns = i128::from(cycles) * NANOS_PER_SEC / self.cycles_per_sec;
        ns.min(i128::from(i64::MAX)) as i64
    }

    /// Convert and check against the run bounds.
    pub fn reconcile(&self, cycle_count: u64) -> (i64, Option<DataQualityWarning>) {
        let wall_time_ns = self.to_wall_time_ns(cycle_count);
        let warning = self.bounds.and_then(|bounds| {
            if bounds.contains(wall_time_ns) {
                None
            } else {
                Some(DataQualityWarning {
                    cycle_count,
                    wall_time_ns,
                    bounds,
                })
            }
        });
        if let Some(ref w) = warning {
            debug!("suspect timestamp: {}", w);
        }
        (wall_time_ns, warning)
    }
}
