//! # fixq-core
//!
//! Structural side of a fixed-point filter realization.
//!
//! - [`TopologyModel`]: immutable signal-flow graph of input, output,
//!   constant, add, multiply and delay nodes, built with [`TopologyBuilder`]
//!   or realized from a [`FilterDescription`]
//! - [`RangeTracker`]: worst-case integer-bit growth, producing a
//!   [`FormatAssignment`] with one format per node
//!
//! Topologies carry no formats, so re-quantizing a design never touches the
//! floating-point structure it came from.

pub mod assignment;
pub mod error;
pub mod range;
pub mod structure;
pub mod topology;

pub use assignment::FormatAssignment;
pub use error::TopologyError;
pub use range::{FractionalPolicy, RangeTracker};
pub use structure::{Coefficients, FilterDescription, Structure};
pub use topology::{Node, NodeId, NodeKind, TopologyBuilder, TopologyModel};
