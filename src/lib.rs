//! # fixq
//!
//! Fixed-point quantization of digital filters: from floating-point
//! coefficients to a sized, bit-exactly simulated, synthesizable design.
//!
//! Key types:
//! - [`DesignConfig`]: JSON settings (coefficients, structure, word lengths, policies)
//! - [`QuantizedDesign`]: A shared topology plus its format assignment, ready to
//!   simulate against the `f64` reference or emit as Verilog
//!
//! The member crates are re-exported for callers that drive the stages
//! individually.

pub mod config;
pub mod pipeline;

pub use config::DesignConfig;
pub use pipeline::{PipelineError, QuantizedDesign};

pub use fixq_core::{
    Coefficients, FilterDescription, FormatAssignment, FractionalPolicy, NodeId, NodeKind,
    RangeTracker, Structure, TopologyBuilder, TopologyError, TopologyModel,
};
pub use fixq_hdl::{emit, sanitize_module_name, Netlist, NetlistError};
pub use fixq_math::{
    quantize, requantize, FixedPointError, FixedPointFormat, OverflowPolicy, QuantizationPolicy,
    QuantizedValue,
};
pub use fixq_sim::{
    compare, frequency_grid, group_delay, impulse_response, run, run_channels, run_reference,
    sos_group_delay, step_response, zpk_group_delay, ErrorStats, FixedPointSimulator,
    OverflowEvent, OverflowKind, SimulationError, SimulationResult,
};
