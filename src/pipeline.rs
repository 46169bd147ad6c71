//! End-to-end flow: realize, size, simulate, emit.

use std::sync::Arc;

use fixq_core::{FormatAssignment, RangeTracker, TopologyError, TopologyModel};
use fixq_hdl::{emit, Netlist, NetlistError};
use fixq_math::FixedPointError;
use fixq_sim::{compare, run, run_reference, ErrorStats, SimulationError, SimulationResult};
use thiserror::Error;
use tracing::debug;

use crate::config::DesignConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Format error: {0}")]
    Format(#[from] FixedPointError),
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Netlist error: {0}")]
    Netlist(#[from] NetlistError),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// A topology together with a complete format assignment.
///
/// The topology is immutable and shared; re-sizing with another tracker
/// produces a new design over the same `Arc`.
#[derive(Debug, Clone)]
pub struct QuantizedDesign {
    topology: Arc<TopologyModel>,
    assignment: FormatAssignment,
    module_name: String,
}

impl QuantizedDesign {
    /// Size `topology` with `tracker`
    pub fn new(
        topology: Arc<TopologyModel>,
        tracker: &RangeTracker,
        module_name: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let assignment = tracker.size(&topology)?;
        Ok(Self {
            topology,
            assignment,
            module_name: module_name.into(),
        })
    }

    /// Use a caller-supplied assignment; it must cover every node
    pub fn with_assignment(
        topology: Arc<TopologyModel>,
        assignment: FormatAssignment,
        module_name: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        assignment.covers(&topology)?;
        Ok(Self {
            topology,
            assignment,
            module_name: module_name.into(),
        })
    }

    pub fn from_config(config: &DesignConfig) -> Result<Self, PipelineError> {
        let topology = Arc::new(config.filter.realize()?);
        let tracker = config.range_tracker()?;
        let design = Self::new(topology, &tracker, config.module_name.clone())?;
        debug!(
            structure = %config.filter.structure,
            nodes = design.topology.len(),
            total_bits = design.assignment.total_bits(),
            widest = design.assignment.max_word_length(),
            "design sized"
        );
        Ok(design)
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Self::from_config(&DesignConfig::from_json(text)?)
    }

    pub fn topology(&self) -> &Arc<TopologyModel> {
        &self.topology
    }

    pub fn assignment(&self) -> &FormatAssignment {
        &self.assignment
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Same topology, sized again by `tracker`
    pub fn requantize(&self, tracker: &RangeTracker) -> Result<Self, PipelineError> {
        Self::new(Arc::clone(&self.topology), tracker, self.module_name.clone())
    }

    /// Bit-exact run over a single input channel
    pub fn simulate(&self, samples: &[f64]) -> Result<SimulationResult, PipelineError> {
        Ok(run(&self.topology, &self.assignment, samples)?)
    }

    /// The same topology in `f64`, first output only
    pub fn reference(&self, samples: &[f64]) -> Result<Vec<f64>, PipelineError> {
        let mut outputs = run_reference(&self.topology, &[samples])?;
        Ok(if outputs.is_empty() {
            Vec::new()
        } else {
            outputs.swap_remove(0)
        })
    }

    /// Quantization error of the first output against the `f64` reference
    pub fn error(&self, samples: &[f64]) -> Result<ErrorStats, PipelineError> {
        let quantized = self.simulate(samples)?;
        let reference = self.reference(samples)?;
        Ok(compare(quantized.output(), &reference)?)
    }

    pub fn netlist(&self) -> Result<Netlist, PipelineError> {
        Ok(emit(&self.topology, &self.assignment, &self.module_name)?)
    }
}
