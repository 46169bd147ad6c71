//! Word-length exploration.
//!
//! Each candidate signal format is sized and simulated independently
//! against one shared, read-only topology. Every run owns its assignment
//! and simulator state, so candidates execute in parallel without
//! synchronization.

use fixq_core::{FormatAssignment, RangeTracker, TopologyModel};
use fixq_math::FixedPointFormat;
use rayon::prelude::*;

use crate::error::SimulationError;
use crate::simulator::{run, SimulationResult};

/// One candidate's sizing and simulation
#[derive(Debug, Clone)]
pub struct Exploration {
    pub format: FixedPointFormat,
    pub assignment: FormatAssignment,
    pub result: SimulationResult,
}

/// Size and simulate `topology` once per candidate signal format.
///
/// Results come back in candidate order; a candidate that cannot be sized
/// (e.g. growth past 64 bits) yields its own error without affecting the
/// others.
pub fn explore(
    topology: &TopologyModel,
    candidates: &[FixedPointFormat],
    samples: &[f64],
) -> Vec<Result<Exploration, SimulationError>> {
    explore_with(topology, candidates, samples, RangeTracker::new)
}

/// Like [`explore`], with a caller-built tracker per candidate
pub fn explore_with<F>(
    topology: &TopologyModel,
    candidates: &[FixedPointFormat],
    samples: &[f64],
    tracker: F,
) -> Vec<Result<Exploration, SimulationError>>
where
    F: Fn(FixedPointFormat) -> RangeTracker + Sync,
{
    candidates
        .par_iter()
        .map(|&format| -> Result<Exploration, SimulationError> {
            let assignment = tracker(format).size(topology)?;
            let result = run(topology, &assignment, samples)?;
            tracing::debug!(
                format = %format,
                overflows = result.overflow_count(),
                "candidate explored"
            );
            Ok(Exploration {
                format,
                assignment,
                result,
            })
        })
        .collect()
}

/// The successful, overflow-free exploration with the fewest total bits
pub fn narrowest_overflow_free(
    explorations: &[Result<Exploration, SimulationError>],
) -> Option<&Exploration> {
    explorations
        .iter()
        .filter_map(|e| e.as_ref().ok())
        .filter(|e| e.result.is_overflow_free())
        .min_by_key(|e| (e.assignment.total_bits(), e.format.word_length()))
}
