//! Per-rank phase timing and its reduction to min/max/average.
//!
//! A [`Phase`] is entered and exited by every rank together. Entry waits at
//! a barrier and then starts the clock, so no rank is charged for time
//! another rank spent getting ready. Exit stops the clock and then waits
//! again, so the next phase starts from a common point.

use std::time::{Duration, Instant};

use crate::comm::{COORDINATOR, Communicator, ReduceOp};
use crate::error::Result;

/// One rank's elapsed time for the measured phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimingSample(pub Duration);

impl TimingSample {
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

/// A running measured phase. Consumed by [`Phase::exit`], so every entry
/// has exactly one exit.
#[must_use = "a phase must be exited on every rank"]
pub struct Phase {
    start: Instant,
}

impl Phase {
    pub fn enter(comm: &dyn Communicator) -> Result<Self> {
        comm.barrier()?;
        Ok(Self { start: Instant::now() })
    }

    pub fn exit(self, comm: &dyn Communicator) -> Result<TimingSample> {
        let sample = TimingSample(self.start.elapsed());
        comm.barrier()?;
        Ok(sample)
    }
}

/// Job-wide timing, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl TimingStats {
    /// Summarise samples held locally. `None` for an empty slice.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let first = *samples.first()?;
        let (min, max, sum) = samples
            .iter()
            .skip(1)
            .fold((first, first, first), |(lo, hi, sum), &s| (lo.min(s), hi.max(s), sum + s));
        Some(Self::new(min, max, sum, samples.len()))
    }

    fn new(min: f64, max: f64, sum: f64, count: usize) -> Self {
        // Rounding in the sum must not push the mean outside [min, max].
        let avg = (sum / count as f64).clamp(min, max);
        Self { min, max, avg }
    }
}

/// Reduce every rank's sample to min, max and average on the coordinator.
///
/// All ranks must call this together. Only the coordinator gets `Some`.
pub fn aggregate(comm: &dyn Communicator, sample: TimingSample) -> Result<Option<TimingStats>> {
    let secs = sample.as_secs_f64();
    let min = comm.reduce(secs, ReduceOp::Min, COORDINATOR)?;
    let max = comm.reduce(secs, ReduceOp::Max, COORDINATOR)?;
    let sum = comm.reduce(secs, ReduceOp::Sum, COORDINATOR)?;

    Ok(match (min, max, sum) {
        (Some(min), Some(max), Some(sum)) => Some(TimingStats::new(min, max, sum, comm.world_size())),
        _ => None,
    })
}

/// Collect each rank's raw sample on the coordinator, indexed by rank.
pub fn collect_samples(comm: &dyn Communicator, sample: TimingSample) -> Result<Option<Vec<f64>>> {
    comm.gather_samples(sample.as_secs_f64(), COORDINATOR)
}
