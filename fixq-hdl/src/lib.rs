//! # fixq-hdl
//!
//! Verilog emission for sized filter topologies.
//!
//! Key items:
//! - [`emit`]: One synthesizable module per topology, bit-exact with the simulator
//! - [`sanitize_module_name`]: Arbitrary names to legal Verilog identifiers
//!
//! Emission is deterministic; [`Netlist::digest`] can be compared across runs.

pub mod error;
pub mod sanitize;
pub mod verilog;

pub use error::NetlistError;
pub use sanitize::{module_name_from_path, sanitize_module_name};
pub use verilog::{emit, Netlist};
